/// VietQR payment-image URL construction
///
/// Pure string building; scanning the image in a banking app pre-fills the
/// account, amount, and transfer note. No network call is made here.
use crate::config::PaymentConfig;

/// Build a VietQR image URL for the given amount and transfer note
pub fn build_qr_url(payment: &PaymentConfig, amount_vnd: i64, transfer_note: &str) -> String {
    let base = format!(
        "https://img.vietqr.io/image/{}-{}-{}.png",
        payment.bank_id, payment.account_no, payment.qr_template
    );

    format!(
        "{}?amount={}&addInfo={}&accountName={}",
        base,
        amount_vnd,
        urlencoding::encode(transfer_note),
        urlencoding::encode(&payment.account_name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> PaymentConfig {
        PaymentConfig {
            bank_id: "970422".to_string(),
            account_no: "123456789".to_string(),
            account_name: "LAND HUB".to_string(),
            qr_template: "compact2".to_string(),
        }
    }

    #[test]
    fn test_build_qr_url() {
        let url = build_qr_url(&payment(), 100_000, "UPGRADE_USER_3_ORDER_5");
        assert_eq!(
            url,
            "https://img.vietqr.io/image/970422-123456789-compact2.png\
             ?amount=100000&addInfo=UPGRADE_USER_3_ORDER_5&accountName=LAND%20HUB"
        );
    }

    #[test]
    fn test_note_is_url_encoded() {
        let url = build_qr_url(&payment(), 1, "a b&c");
        assert!(url.contains("addInfo=a%20b%26c"));
    }
}
