use rand::Rng;

use super::claims::PendingUser;
use super::jwt::TokenCodec;
use crate::error::ApiError;

/// A freshly issued activation bundle: the signed token the client must hold
/// on to, and the numeric code delivered out of band by email.
pub struct Activation {
    pub token: String,
    pub otp: u64,
}

/// Generates numeric one-time codes and wraps them together with
/// pending-signup data into a time-boxed activation token.
pub struct OtpIssuer {
    digits: u32,
}

impl OtpIssuer {
    pub fn new(digits: u32) -> Result<Self, ApiError> {
        if !(6..=10).contains(&digits) {
            return Err(ApiError::Configuration(format!(
                "OTP length must be between 6 and 10 digits, got {digits}"
            )));
        }
        Ok(Self { digits })
    }

    fn generate(&self) -> u64 {
        let min = 10u64.pow(self.digits - 1);
        let max = 10u64.pow(self.digits);
        rand::thread_rng().gen_range(min..max)
    }

    pub fn issue(
        &self,
        codec: &TokenCodec,
        pending: PendingUser,
    ) -> Result<Activation, ApiError> {
        let otp = self.generate();
        let token = codec
            .sign_activation(pending, otp)
            .map_err(|e| ApiError::Upstream(anyhow::anyhow!(e).context("signing activation token")))?;
        Ok(Activation { token, otp })
    }
}

/// Numeric comparison of a client-submitted code against the decoded one.
/// Anything that does not parse as a number never matches (fail closed).
pub fn otp_matches(decoded: u64, provided: &serde_json::Value) -> bool {
    let provided = match provided {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    provided == Some(decoded)
}
