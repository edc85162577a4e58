use strum_macros::{Display, EnumIter, IntoStaticStr};

/// Named, ordered stage of a request's lifecycle.
///
/// Declaration order is execution order. `render` runs between
/// [`Phase::AfterFetch`] and [`Phase::BeforeResponse`] but is not a phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Booting,
    Booted,
    BeforeRequest,
    AfterRequest,
    BeforeFetch,
    Fetch,
    AfterFetch,
    BeforeResponse,
    /// Entered only when a hook or `render` fails
    Error,
    AfterResponse,
}

impl Phase {
    /// Phases run before `render`, in order
    pub const BEFORE_RENDER: [Phase; 7] = [
        Phase::Booting,
        Phase::Booted,
        Phase::BeforeRequest,
        Phase::AfterRequest,
        Phase::BeforeFetch,
        Phase::Fetch,
        Phase::AfterFetch,
    ];

    /// The full ordered sequence, including the conditional `Error` phase
    pub fn tracked() -> impl Iterator<Item = Phase> {
        <Phase as strum::IntoEnumIterator>::iter()
    }

    /// Phases visited by a run in which nothing fails
    pub fn successful_run() -> Vec<Phase> {
        Self::tracked().filter(|phase| *phase != Phase::Error).collect()
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
