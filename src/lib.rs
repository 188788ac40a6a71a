//file: lib.rs
// desc: handwritten kanji recognition webapp - modules and wasm entry point

use wasm_bindgen::prelude::*;

pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod inference;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod rank;
pub mod readings;
pub mod session;
pub mod storage;
mod web;

pub use config::AppConfig;
pub use error::{AuthError, ConfigError, RecognizeError, StorageError};
pub use inference::{ModelInfo, Recognizer};
pub use preprocess::Raster;
pub use rank::RecognitionResult;
pub use web::sign_in_with_google;

#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();

    // an unusable provider selection is a deployment error, stop here
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            wasm_bindgen::throw_str(&e.to_string());
        }
    };
    log::info!(
        "Starting with {:?} recognizer, {:?} storage, {:?} auth",
        config.recognizer,
        config.storage,
        config.auth
    );

    leptos::mount_to_body(move || leptos::view! { <web::App config=config/> });
}
