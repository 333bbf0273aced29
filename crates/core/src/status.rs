//! Remote task status, mirroring the numeric codes used by NodeODM.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status code type as reported by the engine (`status.code`).
pub type StatusCode = u16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the engine status code.
            pub fn code(self) -> StatusCode {
                self as StatusCode
            }

            /// Lowercase label used on the command line and in logs.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            /// Map an engine status code back to a variant.
            pub fn from_code(code: StatusCode) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.code() == code)
            }
        }

        impl From<$name> for StatusCode {
            fn from(value: $name) -> Self {
                value as StatusCode
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle status of a remote processing task.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    TaskStatus {
        Queued = 10 => "queued",
        Running = 20 => "running",
        Failed = 30 => "failed",
        Completed = 40 => "completed",
        Canceled = 50 => "canceled",
    }
}

impl TaskStatus {
    /// A terminal task will not change status any more.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::Completed | TaskStatus::Canceled
        )
    }

    /// Queued or running tasks can still be cancelled.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        // "cancelled" is accepted as an alias for the engine's spelling.
        let lower = if lower == "cancelled" { "canceled".to_string() } else { lower };
        TaskStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| CoreError::Validation(format!("Unknown task status: '{s}'")))
    }
}
