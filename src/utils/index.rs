/// Satoshis in one bitcoin.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Render a satoshi amount as BTC with all eight decimals, e.g. `0.00015000 BTC`.
pub fn format_btc_amount(sats: u64) -> String {
    format!("{}.{:08} BTC", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}

/// Render a signed history delta, e.g. `-0.00012500 BTC`.
pub fn format_btc_delta(delta: i64) -> String {
    let sign = if delta < 0 { "-" } else { "+" };
    format!("{}{}", sign, format_btc_amount(delta.unsigned_abs()))
}
