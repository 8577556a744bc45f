//! Plans for which shards a cluster runs.

use std::{
    env,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Environment variable carrying a comma-separated list of shard IDs.
pub const SHARD_IDS_VAR: &str = "ACCORD_SHARD_IDS";

/// Environment variable carrying the total shard count.
pub const SHARD_COUNT_VAR: &str = "ACCORD_SHARD_COUNT";

/// Building a shard scheme failed.
#[derive(Debug)]
pub struct ShardSchemeError {
    kind: ShardSchemeErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ShardSchemeError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ShardSchemeErrorType {
        &self.kind
    }
}

impl Display for ShardSchemeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ShardSchemeErrorType::IdTooLarge { id, total } => {
                f.write_str("shard ID ")?;
                Display::fmt(id, f)?;
                f.write_str(" is not less than the total of ")?;

                Display::fmt(total, f)
            }
            ShardSchemeErrorType::NoShards => f.write_str("the scheme names no shards"),
            ShardSchemeErrorType::ParsingEnv { name } => {
                f.write_str("environment variable ")?;
                f.write_str(name)?;

                f.write_str(" could not be parsed")
            }
        }
    }
}

impl Error for ShardSchemeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`ShardSchemeError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ShardSchemeErrorType {
    /// A shard ID is not below the total shard count.
    IdTooLarge {
        /// The offending ID.
        id: u64,
        /// Total number of shards.
        total: u64,
    },
    /// The scheme would start no shards.
    NoShards,
    /// An environment variable held an unparsable value.
    ParsingEnv {
        /// Name of the variable.
        name: &'static str,
    },
}

/// The method of sharding to use.
///
/// By default this is [`Auto`].
///
/// [`Auto`]: Self::Auto
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ShardScheme {
    /// Ask the service for its recommended shard count and start all of
    /// them.
    Auto,
    /// Start an explicit set of shard IDs out of a total.
    Ids {
        /// IDs of the shards to start.
        ids: Vec<u64>,
        /// Total number of shards used by the bot.
        total: u64,
    },
    /// Start a contiguous range of shard IDs out of a total.
    Range {
        /// First shard ID to start.
        from: u64,
        /// Last shard ID to start.
        to: u64,
        /// Total number of shards used by the bot.
        total: u64,
    },
}

impl ShardScheme {
    /// Create a scheme from explicit shard IDs.
    ///
    /// # Errors
    ///
    /// Returns a [`ShardSchemeErrorType::NoShards`] error type for an empty
    /// list and a [`ShardSchemeErrorType::IdTooLarge`] error type if an ID
    /// is not below the total.
    pub fn ids(ids: Vec<u64>, total: u64) -> Result<Self, ShardSchemeError> {
        if ids.is_empty() {
            return Err(ShardSchemeError {
                kind: ShardSchemeErrorType::NoShards,
                source: None,
            });
        }

        if let Some(id) = ids.iter().copied().find(|id| *id >= total) {
            return Err(ShardSchemeError {
                kind: ShardSchemeErrorType::IdTooLarge { id, total },
                source: None,
            });
        }

        Ok(Self::Ids { ids, total })
    }

    /// Create a scheme from an inclusive range of shard IDs.
    ///
    /// # Errors
    ///
    /// Returns a [`ShardSchemeErrorType::NoShards`] error type for an
    /// inverted range and a [`ShardSchemeErrorType::IdTooLarge`] error type
    /// if the end of the range is not below the total.
    pub fn range(from: u64, to: u64, total: u64) -> Result<Self, ShardSchemeError> {
        if from > to {
            return Err(ShardSchemeError {
                kind: ShardSchemeErrorType::NoShards,
                source: None,
            });
        }

        if to >= total {
            return Err(ShardSchemeError {
                kind: ShardSchemeErrorType::IdTooLarge { id: to, total },
                source: None,
            });
        }

        Ok(Self::Range { from, to, total })
    }

    /// Read a scheme from the environment.
    ///
    /// Both [`SHARD_IDS_VAR`] and [`SHARD_COUNT_VAR`] must be set; when they
    /// are, they override any programmatic plan. Returns `Ok(None)` when
    /// either is absent.
    ///
    /// # Errors
    ///
    /// Returns a [`ShardSchemeErrorType::ParsingEnv`] error type if a set
    /// variable fails to parse, plus the validation error types of
    /// [`Self::ids`].
    pub fn from_env() -> Result<Option<Self>, ShardSchemeError> {
        let (Ok(ids), Ok(count)) = (env::var(SHARD_IDS_VAR), env::var(SHARD_COUNT_VAR)) else {
            return Ok(None);
        };

        let ids = ids
            .split(',')
            .map(|id| id.trim().parse())
            .collect::<Result<Vec<u64>, _>>()
            .map_err(|source| ShardSchemeError {
                kind: ShardSchemeErrorType::ParsingEnv {
                    name: SHARD_IDS_VAR,
                },
                source: Some(Box::new(source)),
            })?;

        let total = count.trim().parse().map_err(|source| ShardSchemeError {
            kind: ShardSchemeErrorType::ParsingEnv {
                name: SHARD_COUNT_VAR,
            },
            source: Some(Box::new(source)),
        })?;

        Self::ids(ids, total).map(Some)
    }

    /// The shard IDs the scheme names, in starting order.
    ///
    /// `None` for [`Self::Auto`], whose IDs aren't known until the service
    /// is asked.
    #[must_use]
    pub fn shard_ids(&self) -> Option<Vec<u64>> {
        match self {
            Self::Auto => None,
            Self::Ids { ids, .. } => Some(ids.clone()),
            Self::Range { from, to, .. } => Some((*from..=*to).collect()),
        }
    }

    /// Total number of shards used by the bot, if known.
    #[must_use]
    pub const fn total(&self) -> Option<u64> {
        match self {
            Self::Auto => None,
            Self::Ids { total, .. } | Self::Range { total, .. } => Some(*total),
        }
    }
}

impl Default for ShardScheme {
    fn default() -> Self {
        Self::Auto
    }
}

#[cfg(test)]
mod tests {
    use super::{ShardScheme, ShardSchemeError, ShardSchemeErrorType};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{error::Error, fmt::Debug, hash::Hash};

    assert_fields!(ShardSchemeErrorType::IdTooLarge: id, total);
    assert_impl_all!(ShardSchemeError: Error, Send, Sync);
    assert_impl_all!(
        ShardScheme: Clone,
        Debug,
        Default,
        Eq,
        Hash,
        PartialEq,
        Send,
        Sync
    );

    #[test]
    fn explicit_ids() {
        let scheme = ShardScheme::ids(vec![0, 2, 4], 6).unwrap();

        assert_eq!(Some(vec![0, 2, 4]), scheme.shard_ids());
        assert_eq!(Some(6), scheme.total());
    }

    #[test]
    fn id_equal_to_total_is_rejected() {
        let error = ShardScheme::ids(vec![0, 4], 4).unwrap_err();

        assert!(matches!(
            error.kind(),
            ShardSchemeErrorType::IdTooLarge { id: 4, total: 4 }
        ));
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert!(matches!(
            ShardScheme::ids(Vec::new(), 4).unwrap_err().kind(),
            ShardSchemeErrorType::NoShards
        ));
    }

    #[test]
    fn range_expands() {
        let scheme = ShardScheme::range(2, 4, 10).unwrap();

        assert_eq!(Some(vec![2, 3, 4]), scheme.shard_ids());
        assert_eq!(Some(10), scheme.total());
    }

    #[test]
    fn auto_is_unknown() {
        assert!(ShardScheme::Auto.shard_ids().is_none());
        assert!(ShardScheme::Auto.total().is_none());
    }
}
