use std::sync::Arc;

use crate::{
    cache::ImageCache,
    config::Config,
    events::EventsFile,
    session::{SessionStore, SingleSlotSessions},
    store::{CloudinaryStore, ImageStore},
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ImageStore>,
    pub cache: ImageCache,
    pub sessions: Arc<dyn SessionStore>,
    pub events: EventsFile,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();

        let store = CloudinaryStore::new(&config).expect("Image host misconfigured!");
        let events = EventsFile::load(&config.events_file).expect("Events data misconfigured!");

        Arc::new(Self {
            store: Arc::new(store),
            cache: ImageCache::new(),
            sessions: Arc::new(SingleSlotSessions::new()),
            events,
            config,
        })
    }
}
