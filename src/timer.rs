//! Timers without an async runtime.
//!
//! Natively a `futures-timer` delay drives the wakeup from its shared timer
//! thread; in the browser a oneshot channel is completed from a `setTimeout`
//! callback. Either way the returned future is `'static` and can be raced
//! against the interpreter.

use std::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
	time::Duration,
};

/// Resolves after `duration`. A zero duration resolves on first poll.
#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
	if duration.is_zero() {
		return;
	}
	futures_timer::Delay::new(duration).await;
}

/// Resolves after `duration`. A zero duration resolves on first poll.
#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
	use futures::channel::oneshot;
	use wasm_bindgen::{JsCast, closure::Closure};

	if duration.is_zero() {
		return;
	}
	let (tx, rx) = oneshot::channel::<()>();
	let callback = Closure::once_into_js(move || {
		let _ = tx.send(());
	});
	let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
	let scheduled = web_sys::window()
		.map(|window| window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis));
	if !matches!(scheduled, Some(Ok(_))) {
		log::warn!("setTimeout unavailable; timer of {millis}ms will never fire");
	}
	// A dropped sender means the page tore the timer down; treat it as elapsed.
	let _ = rx.await;
}

/// Gives other futures in the same `select` a chance to run.
pub fn yield_now() -> YieldNow {
	YieldNow { yielded: false }
}

pub struct YieldNow {
	yielded: bool,
}

impl Future for YieldNow {
	type Output = ();

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
		if self.yielded {
			Poll::Ready(())
		} else {
			self.yielded = true;
			cx.waker().wake_by_ref();
			Poll::Pending
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::{executor::block_on, future::Either, pin_mut};
	use std::time::Instant;

	#[test]
	fn sleep_waits_roughly_the_requested_time() {
		let started = Instant::now();
		block_on(sleep(Duration::from_millis(20)));
		assert!(started.elapsed() >= Duration::from_millis(20));
	}

	#[test]
	fn zero_sleep_is_immediate() {
		block_on(sleep(Duration::ZERO));
	}

	#[test]
	fn dropped_sleeps_do_not_hold_the_process() {
		let started = Instant::now();
		for _ in 0..100 {
			let long = sleep(Duration::from_secs(60));
			let short = sleep(Duration::from_millis(1));
			pin_mut!(long, short);
			assert!(matches!(block_on(futures::future::select(long, short)), Either::Right(_)));
		}
		assert!(started.elapsed() < Duration::from_secs(5));
	}

	#[test]
	fn yielding_loop_loses_race_against_timer() {
		let spin = async {
			for _ in 0..u64::MAX {
				yield_now().await;
			}
		};
		let timer = sleep(Duration::from_millis(10));
		pin_mut!(spin, timer);
		let winner = block_on(futures::future::select(spin, timer));
		assert!(matches!(winner, Either::Right(_)));
	}
}
