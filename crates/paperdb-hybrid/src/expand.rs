//! Expansion gate. Short queries lack context for both engines, so they
//! are sent through the expander; anything at or above the token threshold
//! passes through untouched. Expansion failure is never fatal: the request
//! continues with the verbatim text.

use std::time::Duration;

use tracing::{debug, warn};

use paperdb_core::config::ExpansionConfig;
use paperdb_core::traits::QueryExpander;
use paperdb_core::types::{ExpandedQuery, Provenance};

pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Apply the expansion policy to a query. Returns the text both engines
/// will retrieve with, tagged with its provenance.
pub async fn maybe_expand(
    expander: &dyn QueryExpander,
    config: &ExpansionConfig,
    query: &str,
) -> ExpandedQuery {
    let verbatim = ExpandedQuery {
        text: query.to_string(),
        provenance: Provenance::Verbatim,
    };
    if !config.enabled || token_count(query) >= config.min_tokens {
        return verbatim;
    }

    let deadline = Duration::from_millis(config.timeout_ms);
    match tokio::time::timeout(deadline, expander.expand(query, config.budget)).await {
        Ok(Ok(expanded)) if expanded != query => {
            debug!(original = query, expanded = %expanded, "query expanded");
            ExpandedQuery { text: expanded, provenance: Provenance::Expanded }
        }
        Ok(Ok(_)) => verbatim,
        Ok(Err(e)) => {
            warn!(error = %e, "expansion failed, using verbatim query");
            verbatim
        }
        Err(_) => {
            warn!(timeout_ms = config.timeout_ms, "expansion timed out, using verbatim query");
            verbatim
        }
    }
}
