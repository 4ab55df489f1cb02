use std::sync::Arc;

use chat_backend::ChatBackend;
use chat_backend_http::ReaderBackend;
use chat_backend_mock::MockBackend;

use crate::config::{backend_choice_from_env, BackendChoice};

pub fn backend_from_env() -> Result<Arc<dyn ChatBackend>, String> {
    backend_for_choice(backend_choice_from_env()?)
}

pub fn backend_for_choice(choice: BackendChoice) -> Result<Arc<dyn ChatBackend>, String> {
    match choice {
        BackendChoice::Mock => Ok(Arc::new(MockBackend::new())),
        BackendChoice::Http(config) => ReaderBackend::new(config)
            .map(|backend| Arc::new(backend) as Arc<dyn ChatBackend>)
            .map_err(|error| error.message().to_string()),
    }
}
