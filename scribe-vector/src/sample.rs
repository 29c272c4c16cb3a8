//! Approximate uniform sampling of a filtered subset.
//!
//! True uniform sampling would require visiting every matching point. This
//! primitive trades exactness for cost: count the matching points, start a
//! traversal at a uniform-random cursor, over-fetch by 2×, and shuffle in
//! memory. Since point ids are uniform hashes, a random cursor in id space
//! approximates a random position. Callers needing guaranteed uniformity
//! must not rely on this.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::backend::{ScrollRequest, VectorBackend};
use crate::error::{Result, VectorError};
use crate::facets::{MAX_SCROLL_PAGES, SCROLL_PAGE_SIZE};
use crate::filter::Filter;
use crate::ids::POINT_ID_MASK;
use crate::payload::PayloadMap;

/// Sample up to `limit` payloads from the points matching `filter`.
///
/// A filtered set smaller than `limit` returns every member; repeated calls
/// against a larger set return varying subsets. A missing collection yields
/// an empty sample.
pub async fn sample(
    backend: &dyn VectorBackend,
    collection: &str,
    filter: Option<&Filter>,
    limit: usize,
) -> Result<Vec<PayloadMap>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let count = match backend.count(collection, filter, true).await {
        Ok(count) => count as usize,
        Err(VectorError::CollectionNotFound { .. }) => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    if count == 0 {
        return Ok(Vec::new());
    }

    // Over-fetch so the shuffle has something to choose from; skip the
    // random cursor entirely when the whole matching set fits the fetch.
    let fetch_target = (2 * limit).min(count);
    let start = if count <= fetch_target {
        None
    } else {
        Some(rand::thread_rng().gen_range(0..=POINT_ID_MASK))
    };

    let mut seen: HashSet<u64> = HashSet::with_capacity(fetch_target);
    let mut fetched: Vec<PayloadMap> = Vec::with_capacity(fetch_target);
    let mut offset = start;
    let mut wrapped = start.is_none();

    for _ in 0..MAX_SCROLL_PAGES {
        let remaining = fetch_target - fetched.len();
        let request = ScrollRequest {
            filter: filter.cloned(),
            limit: remaining.min(SCROLL_PAGE_SIZE),
            offset,
            fields: None,
        };
        let page = match backend.scroll(collection, &request).await {
            Ok(page) => page,
            Err(VectorError::CollectionNotFound { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        for point in page.points {
            if seen.insert(point.id) {
                fetched.push(point.payload);
            }
        }
        if fetched.len() >= fetch_target {
            break;
        }

        match page.next_offset {
            Some(next) => offset = Some(next),
            // The cursor landed past the tail of id space; wrap once to the
            // start so small filtered sets are never under-returned.
            None if !wrapped => {
                wrapped = true;
                offset = None;
            }
            None => break,
        }
    }

    let mut rng = rand::thread_rng();
    fetched.shuffle(&mut rng);
    fetched.truncate(limit);
    debug!(collection, matching = count, sampled = fetched.len(), "sampled points");
    Ok(fetched)
}
