//! Error type for the MongoDB backend.

use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Errors raised by the MongoDB room store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// URI as supplied.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Client could not be built from the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Initial ping kept failing during connection establishment.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Number of attempts made.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Health-check ping failed on an established connection.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index keys.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A write (insert/replace/update) failed.
    #[error("failed to write to collection `{collection}`")]
    Write {
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A query failed.
    #[error("failed to read from collection `{collection}`")]
    Read {
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A delete failed.
    #[error("failed to delete from collection `{collection}`")]
    Delete {
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
