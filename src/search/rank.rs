use std::cmp::Reverse;
use chrono::NaiveDate;
use crate::metadata::Track;
use crate::utils::fold_text;

/// Sort key of a track for one query; smaller keys are better answers.
///
/// Exact name matches come first, then names starting with the query, then
/// popularity, then newer releases, then name and id. Undated tracks rank
/// after dated ones on the release step so the order stays total.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    exact: Reverse<bool>,
    prefix: Reverse<bool>,
    popularity: Reverse<i32>,
    released: Reverse<Option<NaiveDate>>,
    name: String,
    id: String,
}

impl RankKey {
    fn new(folded_query: &str, track: &Track) -> Self {
        let folded_name = fold_text(&track.name);
        Self {
            exact: Reverse(folded_name == folded_query),
            prefix: Reverse(folded_name.starts_with(folded_query)),
            popularity: Reverse(track.popularity),
            released: Reverse(track.release_date.and_then(|date| date.as_date())),
            name: track.name.clone(),
            id: track.id.clone(),
        }
    }
}

/// Sorts `tracks` best first. Names are folded once per track, not per comparison.
pub fn rank(query: &str, tracks: &mut [Track]) {
    let folded = fold_text(query.trim());
    tracks.sort_by_cached_key(|track| RankKey::new(&folded, track));
}
