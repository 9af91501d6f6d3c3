use std::{fmt, sync::Arc};

use uuid::Uuid;

use crate::{
    config::{ConfigError, SecretConfig, SessionConfig},
    generation::{self, Generator},
    media::{InMemoryMediaStore, MediaStore},
};

/// Everything a session talks to outside itself. Created per session and
/// dropped with it; sessions never share a context implicitly.
#[derive(Clone)]
pub struct SessionContext {
    pub id: Uuid,
    pub generator: Arc<dyn Generator>,
    pub media_store: Option<Arc<dyn MediaStore>>,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(generator: Arc<dyn Generator>, config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            generator,
            media_store: None,
            config,
        }
    }

    pub fn with_media_store(mut self, media_store: Arc<dyn MediaStore>) -> Self {
        self.media_store = Some(media_store);
        self
    }

    /// Builds the configured generator and an in-memory media store.
    pub fn from_config(
        config: SessionConfig,
        secret: Option<&SecretConfig>,
    ) -> Result<Self, ConfigError> {
        let generator = generation::create_generator(&config.generator, secret)?;
        let media_store = Arc::new(InMemoryMediaStore::new(config.media.url_prefix.clone()));
        Ok(Self::new(generator, config).with_media_store(media_store))
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("media_store", &self.media_store.is_some())
            .field("config", &self.config)
            .finish()
    }
}
