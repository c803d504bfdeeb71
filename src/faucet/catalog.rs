//! Built-in faucet catalogue loaded at startup

use crate::faucet::registry::FaucetDefinition;

/// (id, name, url, claim selector, captcha selector, cooldown minutes)
const CATALOGUE: &[(&str, &str, &str, &str, &str, u32)] = &[
    ("cointiply", "Cointiply", "https://cointiply.com/", "#claim-button", ".captcha-container", 60),
    ("freebitcoin", "FreeBitco.in", "https://freebitco.in/", "#free_play_form_button", ".recaptcha-container", 60),
    ("firefaucet", "FireFaucet", "https://firefaucet.win/", ".claim-btn", ".captcha-box", 30),
    ("faucetcrypto", "FaucetCrypto", "https://faucetcrypto.com/", "#claim-button", ".captcha-wrapper", 45),
    ("bitcoinaliens", "Bitcoin Aliens", "https://bitcoinaliens.com/", ".claim-btn", ".captcha-container", 30),
    ("moonbitcoin", "Moon Bitcoin", "https://moonbit.co.in/", "#claim", ".captcha-solve", 60),
    ("allcoins", "AllCoins", "https://allcoins.pw/", ".claim-button", ".captcha-area", 60),
    ("bonusbitcoin", "Bonus Bitcoin", "https://bonusbitcoin.co/", "#claim-btn", ".captcha-section", 15),
    ("bitfun", "BitFun", "https://bitfun.co/", ".claim-now", ".captcha-solve", 30),
    ("cryptostorm", "CryptoStorm", "https://cryptostorm.is/", "#claim-button", ".captcha-box", 45),
    ("btcclicks", "BTC Clicks", "https://btcclicks.com/", ".claim-btn", ".captcha-container", 60),
    ("bitcoinfaucet", "Bitcoin Faucet", "https://bitcoinfaucet.fun/", "#claim", ".captcha-wrap", 30),
    ("satoshihero", "SatoshiHero", "https://satoshihero.com/", ".hero-claim", ".captcha-hero", 60),
    ("bitvisitors", "Bit Visitors", "https://bitvisitors.com/", ".visitor-claim", ".captcha-visitor", 30),
    ("bitcoinker", "Bitcoinker", "https://bitcoinker.com/", "#claim-btn", ".captcha-area", 60),
    ("earnbitmoon", "Earn Bit Moon", "https://earnbitmoon.club/", ".claim-btn", ".captcha-box", 30),
    ("claimfree", "Claim Free", "https://claimfree.co/", "#free-claim", ".captcha-section", 45),
    ("btcfaucet", "BTC Faucet", "https://btcfaucet.co/", ".faucet-claim", ".captcha-solve", 60),
    ("bitcoinpdf", "Bitcoin PDF", "https://bitcoinpdf.org/", "#pdf-claim", ".pdf-captcha", 30),
    ("freecoinsfaucet", "Free Coins Faucet", "https://freecoinsfaucet.com/", ".coins-claim", ".coins-captcha", 45),
    ("btcfree", "BTC Free", "https://btcfree.io/", "#claim-free", ".captcha-free", 60),
    ("cryptowin", "CryptoWin", "https://cryptowin.io/", ".win-claim", ".win-captcha", 30),
    ("satoshipoint", "Satoshi Point", "https://satoshipoint.com/", "#point-claim", ".point-captcha", 45),
    ("bitcoinblender", "Bitcoin Blender", "https://bitcoinblender.org/", ".blend-claim", ".blend-captcha", 60),
    ("freesatoshi", "Free Satoshi", "https://freesatoshi.com/", "#satoshi-claim", ".satoshi-captcha", 30),
    ("coinpayz", "Coinpayz", "https://coinpayz.eu/", ".payz-claim", ".payz-captcha", 45),
    ("earnbitcoin", "Earn Bitcoin", "https://earnbitcoin.world/", "#earn-claim", ".earn-captcha", 60),
    ("bitcoinzebra", "Bitcoin Zebra", "https://bitcoinzebra.com/", "#zebra-claim", ".zebra-captcha", 60),
    ("faucethub", "FaucetHub", "https://faucethub.io/", ".hub-claim", ".hub-captcha", 45),
    ("bitcoinday", "Bitcoin Day", "https://bitcoinday.org/", "#day-claim", ".day-captcha", 30),
    ("claimbtc", "Claim BTC", "https://claimbtc.com/", ".claim-btn-btc", ".claim-captcha-btc", 60),
    ("bitcoinflood", "Bitcoin Flood", "https://bitcoinflood.com/", "#flood-claim", ".flood-captcha", 45),
    ("cryptofaucets", "Crypto Faucets", "https://cryptofaucets.net/", ".crypto-claim-btn", ".crypto-captcha-box", 30),
    ("bitcoinget", "Bitcoin Get", "https://bitcoinget.com/", "#get-claim", ".get-captcha", 60),
    ("satoshispirit", "Satoshi Spirit", "https://satoshispirit.com/", ".spirit-claim", ".spirit-captcha", 45),
    ("freecoin", "Free Coin", "https://freecoin.io/", "#coin-free-claim", ".coin-free-captcha", 30),
    ("bitcoinworm", "Bitcoin Worm", "https://bitcoinworm.com/", ".worm-claim", ".worm-captcha", 60),
    ("satoshiforest", "Satoshi Forest", "https://satoshiforest.com/", "#forest-claim", ".forest-captcha", 45),
    ("bitcoinrain", "Bitcoin Rain", "https://bitcoinrain.io/", ".rain-claim-btn", ".rain-captcha-container", 30),
];

pub fn default_faucets() -> Vec<FaucetDefinition> {
    CATALOGUE
        .iter()
        .map(
            |&(id, name, url, claim_selector, captcha_selector, cooldown_minutes)| {
                FaucetDefinition {
                    id: id.to_string(),
                    name: name.to_string(),
                    url: url.to_string(),
                    claim_selector: claim_selector.to_string(),
                    captcha_selector: Some(captcha_selector.to_string()),
                    cooldown_minutes,
                    enabled: true,
                }
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_ids_unique_and_valid() {
        let faucets = default_faucets();
        let ids: HashSet<_> = faucets.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), faucets.len());
        assert!(faucets.iter().all(|f| f.validate().is_ok()));
    }
}
