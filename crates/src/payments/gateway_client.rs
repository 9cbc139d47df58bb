use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;
type HmacSha256 = Hmac<Sha256>;

pub const PARAM_SECURE_HASH: &str = "vnp_SecureHash";
pub const PARAM_SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
pub const PARAM_TXN_REF: &str = "vnp_TxnRef";
pub const PARAM_RESPONSE_CODE: &str = "vnp_ResponseCode";
pub const PARAM_TRANSACTION_NO: &str = "vnp_TransactionNo";
pub const PARAM_AMOUNT: &str = "vnp_Amount";
pub const PARAM_PAY_DATE: &str = "vnp_PayDate";

/// The gateway's native date format, naive local time of the gateway region.
pub const GATEWAY_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

pub const RESPONSE_CODE_SUCCESS: &str = "00";

// IPN acknowledgement codes the gateway expects back.
pub const ACK_OK: &str = "00";
pub const ACK_ORDER_NOT_FOUND: &str = "01";
pub const ACK_ALREADY_CONFIRMED: &str = "02";
pub const ACK_INVALID_AMOUNT: &str = "04";
pub const ACK_INVALID_SIGNATURE: &str = "97";
pub const ACK_UNKNOWN_ERROR: &str = "99";

/// HMAC-SHA512 for the card/bank redirect flow; the wallet variant of the
/// gateway signs with HMAC-SHA256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgo {
    HmacSha512,
    HmacSha256,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub pay_url: String,
    pub return_url: String,
    pub algo: SignatureAlgo,
}

#[derive(Debug, Clone)]
pub struct GatewayIntent {
    pub order_ref: String,
    pub amount_minor: i32,
    pub order_info: String,
    pub client_ip: String,
    pub created_at: DateTime<Utc>,
}

/// Redirect-style gateway client: the user is sent to a signed URL, the
/// gateway answers with a browser return and a server-to-server notification
/// carrying the same signed parameter set.
pub struct RedirectGatewayClient {
    config: GatewayConfig,
}

impl RedirectGatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn build_redirect_url(&self, intent: &GatewayIntent) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), "2.1.0".to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert(
            PARAM_AMOUNT.to_string(),
            (i64::from(intent.amount_minor) * 100).to_string(),
        );
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert(PARAM_TXN_REF.to_string(), intent.order_ref.clone());
        params.insert("vnp_OrderInfo".to_string(), intent.order_info.clone());
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Locale".to_string(), "en".to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.config.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), intent.client_ip.clone());
        params.insert(
            "vnp_CreateDate".to_string(),
            intent.created_at.format(GATEWAY_DATE_FORMAT).to_string(),
        );

        let query = canonical_query(&params);
        let signature = self.sign(&query)?;

        Ok(format!(
            "{}?{}&{}={}",
            self.config.pay_url, query, PARAM_SECURE_HASH, signature
        ))
    }

    /// Constant-time verification over the canonically sorted parameter list,
    /// excluding the signature fields themselves. Never touches state; a
    /// forged or mangled callback simply returns false.
    pub fn verify_callback(&self, params: &HashMap<String, String>) -> bool {
        let Some(provided) = params.get(PARAM_SECURE_HASH) else {
            return false;
        };
        let Ok(provided) = hex::decode(provided) else {
            return false;
        };

        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(key, _)| {
                key.as_str() != PARAM_SECURE_HASH && key.as_str() != PARAM_SECURE_HASH_TYPE
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let query = canonical_query(&signed);

        match self.config.algo {
            SignatureAlgo::HmacSha512 => {
                let Ok(mut mac) = HmacSha512::new_from_slice(self.config.hash_secret.as_bytes())
                else {
                    return false;
                };
                mac.update(query.as_bytes());
                mac.verify_slice(&provided).is_ok()
            }
            SignatureAlgo::HmacSha256 => {
                let Ok(mut mac) = HmacSha256::new_from_slice(self.config.hash_secret.as_bytes())
                else {
                    return false;
                };
                mac.update(query.as_bytes());
                mac.verify_slice(&provided).is_ok()
            }
        }
    }

    fn sign(&self, payload: &str) -> Result<String> {
        let signature = match self.config.algo {
            SignatureAlgo::HmacSha512 => {
                let mut mac = HmacSha512::new_from_slice(self.config.hash_secret.as_bytes())?;
                mac.update(payload.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            SignatureAlgo::HmacSha256 => {
                let mut mac = HmacSha256::new_from_slice(self.config.hash_secret.as_bytes())?;
                mac.update(payload.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        };
        Ok(signature)
    }
}

fn canonical_query(params: &BTreeMap<String, String>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Translates the gateway's non-zero result codes to user-facing messages.
pub fn decline_message(code: &str) -> &'static str {
    match code {
        "07" => "The transaction is suspected of fraud",
        "09" => "The card is not registered for online payment",
        "10" => "Card verification failed too many times",
        "11" => "The payment window expired",
        "12" => "The card or account is locked",
        "13" => "Wrong one-time password",
        "24" => "The payment was cancelled",
        "51" => "Insufficient funds",
        "65" => "Daily transaction limit exceeded",
        "75" => "The issuing bank is under maintenance",
        "79" => "Wrong payment password too many times",
        _ => "The payment was declined by the gateway",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client(algo: SignatureAlgo) -> RedirectGatewayClient {
        RedirectGatewayClient::new(GatewayConfig {
            tmn_code: "CINEMA01".to_string(),
            hash_secret: "topsecret".to_string(),
            pay_url: "https://sandbox.gateway.example/paymentv2/vpcpay.html".to_string(),
            return_url: "https://api.example.com/payments/vnpay-return".to_string(),
            algo,
        })
    }

    fn signed_params(client: &RedirectGatewayClient) -> HashMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(PARAM_TXN_REF.to_string(), "abc-123".to_string());
        params.insert(PARAM_RESPONSE_CODE.to_string(), "00".to_string());
        params.insert(PARAM_AMOUNT.to_string(), "20000".to_string());

        let signature = client.sign(&canonical_query(&params)).unwrap();
        let mut params: HashMap<String, String> = params.into_iter().collect();
        params.insert(PARAM_SECURE_HASH.to_string(), signature);
        params
    }

    #[test]
    fn redirect_url_is_signed_and_amount_is_times_100() {
        let client = client(SignatureAlgo::HmacSha512);
        let intent = GatewayIntent {
            order_ref: "b1-1700000000000".to_string(),
            amount_minor: 200,
            order_info: "Booking AB12CD34".to_string(),
            client_ip: "203.0.113.9".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 14, 10, 30, 0).unwrap(),
        };

        let url = client.build_redirect_url(&intent).unwrap();
        assert!(url.starts_with("https://sandbox.gateway.example/paymentv2/vpcpay.html?"));
        assert!(url.contains("vnp_Amount=20000"));
        assert!(url.contains("vnp_CreateDate=20250614103000"));
        assert!(url.contains("vnp_TxnRef=b1-1700000000000"));
        assert!(url.contains("vnp_SecureHash="));
    }

    #[test]
    fn canonical_query_sorts_keys_alphabetically() {
        let mut params = BTreeMap::new();
        params.insert("vnp_TxnRef".to_string(), "r".to_string());
        params.insert("vnp_Amount".to_string(), "100".to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());

        assert_eq!(
            canonical_query(&params),
            "vnp_Amount=100&vnp_Command=pay&vnp_TxnRef=r"
        );
    }

    #[test]
    fn verifies_its_own_signature() {
        let client = client(SignatureAlgo::HmacSha512);
        let params = signed_params(&client);
        assert!(client.verify_callback(&params));
    }

    #[test]
    fn wallet_variant_signs_with_sha256() {
        let client = client(SignatureAlgo::HmacSha256);
        let params = signed_params(&client);
        assert!(client.verify_callback(&params));
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let client = client(SignatureAlgo::HmacSha512);
        let mut params = signed_params(&client);

        let signature = params.get_mut(PARAM_SECURE_HASH).unwrap();
        let flipped = if signature.ends_with('0') { "1" } else { "0" };
        signature.replace_range(signature.len() - 1.., flipped);

        assert!(!client.verify_callback(&params));
    }

    #[test]
    fn rejects_a_tampered_parameter() {
        let client = client(SignatureAlgo::HmacSha512);
        let mut params = signed_params(&client);
        params.insert(PARAM_AMOUNT.to_string(), "99999".to_string());
        assert!(!client.verify_callback(&params));
    }

    #[test]
    fn rejects_a_missing_or_malformed_signature() {
        let client = client(SignatureAlgo::HmacSha512);
        let mut params = signed_params(&client);
        params.remove(PARAM_SECURE_HASH);
        assert!(!client.verify_callback(&params));

        params.insert(PARAM_SECURE_HASH.to_string(), "not-hex".to_string());
        assert!(!client.verify_callback(&params));
    }

    #[test]
    fn signature_ignores_the_hash_type_field() {
        let client = client(SignatureAlgo::HmacSha512);
        let mut params = signed_params(&client);
        params.insert(PARAM_SECURE_HASH_TYPE.to_string(), "HmacSHA512".to_string());
        assert!(client.verify_callback(&params));
    }

    #[test]
    fn translates_known_decline_codes() {
        assert_eq!(decline_message("51"), "Insufficient funds");
        assert_eq!(decline_message("24"), "The payment was cancelled");
        assert_eq!(
            decline_message("unmapped"),
            "The payment was declined by the gateway"
        );
    }
}
