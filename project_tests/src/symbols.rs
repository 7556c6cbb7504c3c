use anyhow::{Result, anyhow, bail};
use rand::seq::IndexedRandom;
use url::Url;

/// NASDAQ-100 constituents the harness draws from.
pub const NASDAQ_SYMBOLS: &[&str] = &[
    "AAPL", "ABNB", "ADBE", "ADI", "ADP", "ADSK", "AEP", "ALNY", "AMAT", "AMD",
    "AMGN", "AMZN", "APP", "ARM", "ASML", "AVGO", "AXON", "BKNG", "BKR", "CCEP",
    "CDNS", "CEG", "CHTR", "CMCSA", "COST", "CPRT", "CRWD", "CSCO", "CSGP", "CSX",
    "CTAS", "CTSH", "DASH", "DDOG", "DXCM", "EA", "EXC", "FANG", "FAST", "FER",
    "FTNT", "GEHC", "GILD", "GOOG", "GOOGL", "HON", "IDXX", "INSM", "INTC", "INTU",
    "ISRG", "KDP", "KHC", "KLAC", "LIN", "LRCX", "MAR", "MCHP", "MDLZ", "MELI",
    "META", "MNST", "MPWR", "MRVL", "MSFT", "MSTR", "MU", "NFLX", "NVDA", "NXPI",
    "ODFL", "ORLY", "PANW", "PAYX", "PCAR", "PDD", "PEP", "PLTR", "PYPL", "QCOM",
    "REGN", "ROP", "ROST", "SBUX", "SHOP", "SNPS", "STX", "TEAM", "TMUS", "TRI",
    "TSLA", "TTWO", "TXN", "VRSK", "VRTX", "WBD", "WDAY", "WDC", "WMT", "XEL", "ZS",
];

/// Picks `count` distinct symbols at random.
pub fn pick_symbols(count: usize) -> Result<Vec<String>> {
    if count > NASDAQ_SYMBOLS.len() {
        bail!(
            "asked for {} symbols but only {} are available",
            count,
            NASDAQ_SYMBOLS.len()
        );
    }
    let mut rng = rand::rng();
    Ok(NASDAQ_SYMBOLS
        .choose_multiple(&mut rng, count)
        .map(|s| s.to_string())
        .collect())
}

/// `{base}/stock/{symbol}/quote`, with the symbol percent-encoded as one path segment.
pub fn rest_url(base: &Url, symbol: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("{} cannot take a path", base))?
        .pop_if_empty()
        .extend(["stock", symbol, "quote"]);
    Ok(url)
}

pub fn topic(symbol: &str) -> String {
    format!("T/{}", symbol)
}
