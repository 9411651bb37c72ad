//! API shape detection for introspection libraries

use serde::Serialize;
use std::fmt;

/// Which family of accessor names a library offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiShape {
    /// `cpu_times()`, `memory_info()`, `name()`, ...
    Modern,
    /// `get_cpu_times()`, `get_memory_info()`, plain `name`/`cmdline`/`exe` values, ...
    Legacy,
}

impl fmt::Display for ApiShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modern => f.write_str("modern"),
            Self::Legacy => f.write_str("legacy"),
        }
    }
}

/// What a library can do, resolved once when the adapter is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Capabilities {
    pub shape: ApiShape,
    /// System-wide connection enumeration in a single call
    pub bulk_connections: bool,
}

impl Capabilities {
    pub const fn modern() -> Self {
        Self {
            shape: ApiShape::Modern,
            bulk_connections: true,
        }
    }

    pub const fn legacy() -> Self {
        Self {
            shape: ApiShape::Legacy,
            bulk_connections: false,
        }
    }

    pub const fn with_bulk_connections(mut self, bulk: bool) -> Self {
        self.bulk_connections = bulk;
        self
    }

    pub fn is_modern(&self) -> bool {
        self.shape == ApiShape::Modern
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} api, {} connection enumeration",
            self.shape,
            if self.bulk_connections {
                "bulk"
            } else {
                "per-process"
            }
        )
    }
}
