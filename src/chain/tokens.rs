//! Known tokens on Polygon with their bridged contract addresses.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Crypto,
    Stablecoin,
}

impl TokenKind {
    /// `crypto` or `stablecoin`; anything else means no filter.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "crypto" => Some(Self::Crypto),
            "stablecoin" => Some(Self::Stablecoin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    pub address: &'static str,
    pub kind: TokenKind,
}

const fn crypto(symbol: &'static str, name: &'static str, address: &'static str) -> TokenInfo {
    TokenInfo {
        symbol,
        name,
        address,
        kind: TokenKind::Crypto,
    }
}

const fn stable(symbol: &'static str, name: &'static str, address: &'static str) -> TokenInfo {
    TokenInfo {
        symbol,
        name,
        address,
        kind: TokenKind::Stablecoin,
    }
}

/// Listing order is popularity order.
pub const TOKEN_CATALOG: &[TokenInfo] = &[
    crypto("ETH", "Ethereum", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"),
    crypto("BTC", "Bitcoin", "0x1BFD67037B42Cf73acF2047067bd4F2C47D9BfD6"),
    crypto("WETH", "Wrapped Ethereum", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"),
    crypto("WBTC", "Wrapped Bitcoin", "0x1BFD67037B42Cf73acF2047067bd4F2C47D9BfD6"),
    crypto("MATIC", "Polygon", "0x0000000000000000000000000000000000001010"),
    crypto("LINK", "Chainlink", "0x53E0bca35eC356BD5ddDFebbD1Fc0fD03FaBad39"),
    crypto("UNI", "Uniswap", "0xb33EaAd8d922B1083446DC23f610c2567fB5180f"),
    crypto("AAVE", "Aave", "0xD6DF932A45C0f255f85145f286eA0b292B21C90B"),
    crypto("SOL", "Solana", ""),
    crypto("AVAX", "Avalanche", ""),
    crypto("DOT", "Polkadot", ""),
    stable("USDC", "USD Coin", "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"),
    stable("USDT", "Tether", "0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
    stable("DAI", "Dai Stablecoin", "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"),
    stable("SGD", "Singapore Dollar", "0xDC3326e71D45186F113a2F448984CA0e8D201995"),
    stable("BUSD", "Binance USD", "0xdAb529f40E671A1D4bF91361c21bf9f0C9712ab7"),
    stable("TUSD", "TrueUSD", "0x4c19596f5aaff459fa38b0f7ed92f11ae6543784"),
    stable("USDS", "USDS", "0x45ac379f019e48ca5dac02d0c261e328a28d2d2a"),
    stable("USDP", "Pax Dollar", "0x8e870d67f660d95d5be530380d0ec0bd388289e1"),
    stable("GUSD", "Gemini Dollar", "0x056fd409e1d7a124bd7017459dfea2f387b6d5cd"),
    stable("FRAX", "Frax", "0x853d955acef822db058eb8505911ed77f175b99e"),
];

pub fn of_kind(kind: TokenKind) -> impl Iterator<Item = &'static TokenInfo> {
    TOKEN_CATALOG.iter().filter(move |t| t.kind == kind)
}

/// First token whose contract address matches, ignoring case.
pub fn by_address(address: &str) -> Option<&'static TokenInfo> {
    TOKEN_CATALOG
        .iter()
        .find(|t| !t.address.is_empty() && t.address.eq_ignore_ascii_case(address))
}

pub fn is_stablecoin(symbol: &str) -> bool {
    TOKEN_CATALOG
        .iter()
        .any(|t| t.kind == TokenKind::Stablecoin && t.symbol.eq_ignore_ascii_case(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_address_ignores_case() {
        let token = by_address("0x2791bca1f2de4661ed88a30c99a7a9449aa84174").unwrap();
        assert_eq!(token.symbol, "USDC");
        // Shared bridged address resolves to the first listing
        assert_eq!(by_address("0x7CEB23FD6BC0ADD59E62AC25578270CFF1B9F619").unwrap().symbol, "ETH");
        assert!(by_address("0xdeadbeef").is_none());
        assert!(by_address("").is_none());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(TokenKind::parse(" Stablecoin"), Some(TokenKind::Stablecoin));
        assert_eq!(TokenKind::parse("all"), None);
        assert!(is_stablecoin("usdt"));
        assert!(!is_stablecoin("ETH"));
        assert_eq!(of_kind(TokenKind::Crypto).count(), 11);
    }
}
