//! Browser bindings: localStorage persistence and the exports the page calls.

use std::{cell::RefCell, time::Duration};

use log::info;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::{
	host::{Host, HostConfig},
	init_logging,
	interpreter::ConsoleLine,
	levels::{self, Level},
	runner::{Runner, RunnerConfig},
	session::{MemoryStore, Progress, ProgressStore, STORAGE_KEY, Session, StoreError},
	set_panic_hook,
	validator::ValidationResult,
};

const BROWSER_LATENCY: Duration = Duration::from_millis(25);

pub struct LocalStorageStore {
	storage: web_sys::Storage,
}

impl LocalStorageStore {
	pub fn open() -> Result<Self, StoreError> {
		let window = web_sys::window().ok_or_else(|| StoreError::Unavailable("no global `window` exists".into()))?;
		let storage = window
			.local_storage()
			.map_err(js_unavailable)?
			.ok_or_else(|| StoreError::Unavailable("localStorage is disabled".into()))?;
		Ok(Self { storage })
	}
}

fn js_unavailable(value: JsValue) -> StoreError {
	StoreError::Unavailable(format!("{value:?}"))
}

impl ProgressStore for LocalStorageStore {
	fn load(&self) -> Result<Progress, StoreError> {
		match self.storage.get_item(STORAGE_KEY).map_err(js_unavailable)? {
			Some(json) => Ok(serde_json::from_str(&json)?),
			None => Ok(Progress::default()),
		}
	}

	fn save(&mut self, progress: &Progress) -> Result<(), StoreError> {
		let json = serde_json::to_string(progress)?;
		self.storage.set_item(STORAGE_KEY, &json).map_err(js_unavailable)
	}
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

type BrowserSession = Session<Box<dyn ProgressStore>>;

thread_local! {
	static SESSION: RefCell<Option<BrowserSession>> = const { RefCell::new(None) };
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LevelView<'a> {
	level: &'a Level,
	code: &'a str,
	completed: bool,
	last_result: Option<&'a ValidationResult>,
	last_error: Option<&'a str>,
	console: &'a [ConsoleLine],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LevelEntry {
	id: u32,
	title: &'static str,
	completed: bool,
}

fn to_json(value: &impl Serialize) -> Result<String, JsValue> {
	serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn view(session: &BrowserSession) -> Result<String, JsValue> {
	to_json(&LevelView {
		level: session.level(),
		code: session.code(),
		completed: session.is_completed(session.level().id),
		last_result: session.last_result(),
		last_error: session.last_error(),
		console: session.console(),
	})
}

fn with_session<T>(f: impl FnOnce(&mut BrowserSession) -> Result<T, JsValue>) -> Result<T, JsValue> {
	SESSION.with_borrow_mut(|session| match session {
		Some(session) => f(session),
		None => Err(JsValue::from_str("call start() first")),
	})
}

/// Sets up logging and opens the session saved in localStorage. Returns the
/// current level view as JSON.
#[wasm_bindgen]
pub fn start(experimental_apis: bool) -> Result<String, JsValue> {
	set_panic_hook();
	init_logging();
	info!("Starting Babel's Signal Routing");

	let store: Box<dyn ProgressStore> = match LocalStorageStore::open() {
		Ok(store) => Box::new(store),
		Err(e) => {
			log::warn!("Progress will not be saved: {e}");
			Box::new(MemoryStore::new())
		},
	};
	let host = Host::new(HostConfig {
		latency: BROWSER_LATENCY,
		experimental_apis,
	});
	let session = Session::start(store, Runner::new(RunnerConfig::default(), host));
	let json = view(&session)?;
	SESSION.with_borrow_mut(|slot| *slot = Some(session));
	Ok(json)
}

#[wasm_bindgen]
pub fn level_list() -> Result<String, JsValue> {
	with_session(|session| {
		let entries: Vec<LevelEntry> = levels::all()
			.iter()
			.map(|level| LevelEntry {
				id: level.id,
				title: level.title,
				completed: session.is_completed(level.id),
			})
			.collect();
		to_json(&entries)
	})
}

#[wasm_bindgen]
pub fn select_level(id: u32) -> Result<String, JsValue> {
	with_session(|session| {
		session.select_level(id).map_err(|e| JsValue::from_str(&e.to_string()))?;
		view(session)
	})
}

#[wasm_bindgen]
pub fn set_code(code: String) -> Result<(), JsValue> {
	with_session(|session| {
		session.set_code(code);
		Ok(())
	})
}

/// Runs the editor text. Resolves to the updated level view, or `null` when
/// a run was already in flight.
#[wasm_bindgen]
pub async fn run() -> Result<String, JsValue> {
	let Some(ticket) = with_session(|session| Ok(session.begin_run()))? else {
		return Ok("null".to_string());
	};
	// The session is not borrowed while the script runs.
	let finished = ticket.execute().await;
	with_session(|session| {
		session.finish_run(finished);
		view(session)
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeSet;
	use wasm_bindgen_test::*;

	wasm_bindgen_test_configure!(run_in_browser);

	#[wasm_bindgen_test]
	fn local_storage_round_trips() {
		let mut store = LocalStorageStore::open().unwrap();
		let progress = Progress {
			completed_levels: BTreeSet::from([1, 2]),
			..Progress::default()
		};
		store.save(&progress).unwrap();
		assert_eq!(store.load().unwrap(), progress);
	}
}
