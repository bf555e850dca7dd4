pub mod error;
pub mod hub;
pub mod models;
pub mod orchestrator;
pub mod request;
pub mod stores;
pub mod traits;

pub use error::{ConfigError, SearchFailure};
pub use hub::{ListUpdate, MetadataUpdate, NotificationHub, PageUpdate, Subscription};
pub use models::{
    next_page_index, AggregateState, GeoFilter, GeoPoint, IntentKind, Restaurant, SearchIntent,
    SearchPage, SearchPhase, SearchSettings,
};
pub use orchestrator::{FetchOutcome, SearchCoordinator};
pub use request::{RequestBuilder, SearchDescriptor};
pub use stores::{HttpSearchTransport, HttpTransportConfig};
pub use traits::{
    nearby_intent, FixedLocation, GeoProvider, JsonRecordDecoder, RawSearchResponse,
    RecordDecoder, SearchTransport,
};

pub type RestaurantCoordinator<T> = SearchCoordinator<T, JsonRecordDecoder<Restaurant>>;
