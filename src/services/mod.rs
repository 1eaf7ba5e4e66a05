//module tree
pub mod delivery;
pub mod lifecycle;
pub mod presence_engine;
pub mod replay;

//API exports
pub use delivery::RoomService;
pub use lifecycle::LifecycleService;
pub use presence_engine::PresenceEngine;
pub use replay::ReplayEngine;

//-------------------------------------------------------------------------------------------------------------------

//local shortcuts
use crate::config::AppConfig;
use crate::db::DbAdapter;
use crate::pubsub::RoomPubSub;
use crate::services::presence_engine::PresenceEvent;
use crate::stores::Stores;

//third-party shortcuts
use tokio::sync::mpsc;

//standard shortcuts
use std::sync::Arc;

//-------------------------------------------------------------------------------------------------------------------

/// Bundles every service behind one handle, constructed once at startup and shared through `AppState`.
pub struct Services
{
    pub lifecycle: LifecycleService,
    pub rooms: RoomService,
    pub replay: ReplayEngine,
    pub presence: Arc<PresenceEngine>,
}

impl Services
{
    pub fn new(
        stores: Arc<Stores>,
        db: Arc<dyn DbAdapter>,
        config: AppConfig,
        pubsub: Arc<dyn RoomPubSub>,
    ) -> (Self, mpsc::UnboundedReceiver<PresenceEvent>)
    {
        let (presence, presence_events) = PresenceEngine::new(stores.clone(), config);
        let services = Self{
            lifecycle: LifecycleService::new(stores.clone(), db.clone(), config),
            rooms: RoomService::new(stores.clone(), db.clone(), config, pubsub),
            replay: ReplayEngine::new(stores, db, config),
            presence: Arc::new(presence),
        };
        (services, presence_events)
    }
}

//-------------------------------------------------------------------------------------------------------------------
