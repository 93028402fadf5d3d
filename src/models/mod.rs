use serde::Deserialize;
use utoipa::IntoParams;

/// 以字符串形式落库的枚举：生成 serde 映射、`as_str` 和 `FromStr`
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize, utoipa::ToSchema,
        )]
        pub enum $name {
            $(#[serde(rename = $value)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::utils::ApiError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    _ => Err($crate::utils::ApiError::validation_error(format!(
                        "无效的{}: {}",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod booking;
pub mod campus;
pub mod coach;
pub mod coach_student;
pub mod comment;
pub mod competition;
pub mod evaluation;
pub mod license;
pub mod notification;
pub mod payment;
pub mod student;
pub mod system_log;
pub mod user;

pub use booking::*;
pub use campus::*;
pub use coach::*;
pub use coach_student::*;
pub use comment::*;
pub use competition::*;
pub use evaluation::*;
pub use license::*;
pub use notification::*;
pub use payment::*;
pub use student::*;
pub use system_log::*;
pub use user::*;

fn default_limit() -> i64 {
    100
}

/// 通用分页参数
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { skip: 0, limit: default_limit() }
    }
}

impl Pagination {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }

    /// (limit, offset)，limit 限制在 1..=500
    pub fn bounds(&self) -> (i64, i64) {
        (self.limit.clamp(1, 500), self.skip.max(0))
    }
}
