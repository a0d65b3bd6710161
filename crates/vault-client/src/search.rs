//! Spotify search annotated with what is already sealed.

use vault_proto::track::TrackMetadata;

use crate::backend::VaultBackend;
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub metadata: TrackMetadata,
    pub in_vault: bool,
}

/// Search and mark each hit that is already in the vault. An empty query
/// returns nothing without calling the backend.
pub async fn search(
    backend: &dyn VaultBackend,
    query: &str,
) -> Result<Vec<SearchResult>, ApiError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let hits = backend.search(query).await?;
    let ids: Vec<String> = hits.iter().map(|m| m.spotify_id.clone()).collect();
    let locked = backend.check_tracks(&ids).await?;

    Ok(hits
        .into_iter()
        .map(|metadata| SearchResult {
            in_vault: locked.contains(&metadata.spotify_id),
            metadata,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{ready, FakeBackend};
    use chrono::Utc;

    #[tokio::test]
    async fn test_marks_sealed_hits() {
        let sealed = ready(1, "Teardrop", Utc::now());
        let fake = FakeBackend::with_tracks(vec![sealed.clone()]);
        let mut other = sealed.metadata.clone();
        other.spotify_id = "fresh".to_string();
        other.title = "Teardrop (live)".to_string();
        *fake.catalog.lock().unwrap() = vec![sealed.metadata.clone(), other];

        let results = search(&fake, "  teardrop ").await.unwrap();
        let flags: Vec<_> = results
            .iter()
            .map(|r| (r.metadata.spotify_id.as_str(), r.in_vault))
            .collect();
        assert_eq!(flags, vec![("sp1", true), ("fresh", false)]);
        assert_eq!(fake.calls(), vec!["search:teardrop", "check"]);
    }

    #[tokio::test]
    async fn test_blank_query_skips_backend() {
        let fake = FakeBackend::default();
        assert!(search(&fake, "   ").await.unwrap().is_empty());
        assert!(fake.calls().is_empty());
    }
}
