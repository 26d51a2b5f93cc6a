//! Paginated history fetching.

use crate::provider::{BlockchainDataProvider, ProviderError, TransactionHistoryEntry};
use tracing::debug;

/// Fetch every history entry of `address` from `start_height` onwards.
///
/// Pages of `page_size` are requested from offset 0 and concatenated until a
/// page comes back shorter than `page_size`.
pub async fn fetch_recent_transactions(
    provider: &dyn BlockchainDataProvider,
    address: &str,
    start_height: u64,
    page_size: usize,
) -> Result<Vec<TransactionHistoryEntry>, ProviderError> {
    let page_size = page_size.max(1);
    let mut entries = Vec::new();
    let mut offset = 0;

    loop {
        let page = provider
            .get_transactions(address, Some(start_height), page_size, offset)
            .await?;
        let page_len = page.len();
        entries.extend(page);
        offset += page_len;

        if page_len < page_size {
            break;
        }
    }

    debug!(
        "Fetched {} history entries for {} since height {}",
        entries.len(),
        address,
        start_height
    );
    Ok(entries)
}
