pub mod matching;
pub mod profiles;

pub use matching::{
    GenericMatchStrategy, IndexTransport, MatchingIndexConfig, MatchingIndexWriter,
    NativeNeighborsStrategy, RawTransportStrategy, RetryPolicy,
};
pub use profiles::HttpProfileStore;
