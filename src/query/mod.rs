//! Request parameters for collection queries.

use crate::predicate::Predicate;
use crate::resource::Detail;

/// Query parameter: entity name or partial path (`dc1/prod`, `/dc1/prod`).
pub const NAME_PARAM: &str = "name";
/// Query parameter: detail level. Integers above zero escalate to full.
pub const DETAIL_PARAM: &str = "detail";
/// Header whose presence turns a list into a watch.
pub const WATCH_HEADER: &str = "X-Watch";
/// `X-Watch` option requesting the initial snapshot before live events.
pub const WATCH_SNAPSHOT: &str = "snapshot";

/// A parsed list request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub name: Option<String>,
    pub detail: Detail,
    /// Caller filter, conjoined with the baseline predicate.
    pub predicate: Option<Predicate>,
}

impl ListQuery {
    /// Parse from decoded query-string pairs. Unknown keys are ignored;
    /// for repeated keys the first occurrence wins.
    pub fn from_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = ListQuery::default();
        let mut seen_detail = false;
        for (k, v) in params {
            match k.as_ref() {
                NAME_PARAM if query.name.is_none() => {
                    let v = v.as_ref();
                    if !v.is_empty() {
                        query.name = Some(v.to_owned());
                    }
                }
                DETAIL_PARAM if !seen_detail => {
                    query.detail = Detail::from_param(v.as_ref());
                    seen_detail = true;
                }
                _ => {}
            }
        }
        query
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

/// Options carried by the watch-intent header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchIntent {
    pub snapshot: bool,
}

/// Interpret the `X-Watch` header value. `None` means no watch requested.
///
/// Options are comma separated; only `snapshot` is recognized.
pub fn watch_intent(header: Option<&str>) -> Option<WatchIntent> {
    let header = header?;
    Some(WatchIntent {
        snapshot: header
            .split(',')
            .any(|opt| opt.trim().eq_ignore_ascii_case(WATCH_SNAPSHOT)),
    })
}
