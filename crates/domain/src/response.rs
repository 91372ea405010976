//! Replies notified by the reader on the command characteristic.
//!
//! Every reply is one UTF-8 JSON object:
//!
//! | Command | Success | Error |
//! |---------|---------|-------|
//! | `READ` | `{"balance":600}` | `{"error":"NO_CARD"}` |
//! | `INIT` | `{"status":"SUCCESS","updated_balance":500}` | `{"error":"ALREADY_INIT","balance":150}` |
//! | `RECHARGE` | `{"status":"SUCCESS","updated_balance":700}` | `{"error":"NOT_INIT"}` |
//!
//! [`decode`] separates three cases: a qualifying reply, a well-formed
//! object that carries no marker for the pending command (keep waiting),
//! and a malformed frame (drop it, keep waiting).

use serde_json::{Map, Value};

use crate::amount::Balance;
use crate::command::CommandKind;
use crate::error::CardError;

/// A frame that is not a JSON object.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Payload is not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    Utf8(#[source] std::str::Utf8Error),

    /// Payload is not JSON.
    #[error("frame is not JSON")]
    Json(#[source] serde_json::Error),

    /// Payload is JSON but not an object.
    #[error("frame is JSON but not an object")]
    NotAnObject,
}

/// Error codes the reader firmware reports in the `error` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceErrorCode {
    /// `NO_CARD`
    NoCard,
    /// `ALREADY_INIT`
    AlreadyInit,
    /// `WRITE_FAIL`
    WriteFail,
    /// `FORMAT_FAIL`
    FormatFail,
    /// `MIN_200`
    Min200,
    /// `NOT_INIT`
    NotInit,
    /// `MIN_25_FIRST`
    Min25First,
    /// Anything else, verbatim.
    Other(String),
}

impl DeviceErrorCode {
    /// Parse the `error` field of a reply.
    #[must_use]
    pub fn from_wire(code: &str) -> Self {
        match code {
            "NO_CARD" => Self::NoCard,
            "ALREADY_INIT" => Self::AlreadyInit,
            "WRITE_FAIL" => Self::WriteFail,
            "FORMAT_FAIL" => Self::FormatFail,
            "MIN_200" => Self::Min200,
            "NOT_INIT" => Self::NotInit,
            "MIN_25_FIRST" => Self::Min25First,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Wire spelling of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NoCard => "NO_CARD",
            Self::AlreadyInit => "ALREADY_INIT",
            Self::WriteFail => "WRITE_FAIL",
            Self::FormatFail => "FORMAT_FAIL",
            Self::Min200 => "MIN_200",
            Self::NotInit => "NOT_INIT",
            Self::Min25First => "MIN_25_FIRST",
            Self::Other(code) => code,
        }
    }

    /// Map to the domain error for a reply to a `kind` command.
    ///
    /// Codes that only make sense for one command (`MIN_200` for `INIT`,
    /// `NOT_INIT` and `MIN_25_FIRST` for `RECHARGE`) fall back to
    /// [`CardError::Unknown`] elsewhere.
    #[must_use]
    pub fn into_card_error(self, kind: CommandKind, balance: Option<Balance>) -> CardError {
        match (self, kind) {
            (Self::NoCard, _) => CardError::NoCardDetected,
            (Self::AlreadyInit, _) => CardError::CardAlreadyInitialized { balance },
            (Self::WriteFail, _) => CardError::CardWriteFailed,
            (Self::FormatFail, _) => CardError::CardFormatFailed,
            (Self::Min200, CommandKind::Init) => CardError::MinimumAmountRequired,
            (Self::NotInit, CommandKind::Recharge) => CardError::CardNotInitialized,
            (Self::Min25First, CommandKind::Recharge) => CardError::FirstRechargeMinimum,
            (other, _) => CardError::Unknown(other.as_str().to_owned()),
        }
    }
}

/// Typed success payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Answer to `READ`.
    Balance(Balance),
    /// Answer to `INIT` / `RECHARGE`.
    Updated {
        /// Balance on the card after the write, when reported.
        balance: Option<Balance>,
        /// Amount the reader says it applied, when echoed.
        amount: Option<Balance>,
    },
}

impl Reply {
    /// Balance carried by the reply, whatever its kind.
    #[must_use]
    pub fn balance(&self) -> Option<Balance> {
        match self {
            Self::Balance(balance) => Some(*balance),
            Self::Updated { balance, .. } => *balance,
        }
    }
}

/// A qualifying reply for the pending command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceResponse {
    /// The command succeeded.
    Success(Reply),
    /// The reader reported an error code.
    DeviceError {
        /// Reported code.
        code: DeviceErrorCode,
        /// Balance reported alongside, if any.
        balance: Option<Balance>,
    },
}

impl DeviceResponse {
    /// Resolve into the typed outcome for a `kind` command.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`CardError`] for [`DeviceResponse::DeviceError`].
    pub fn into_result(self, kind: CommandKind) -> Result<Reply, CardError> {
        match self {
            Self::Success(reply) => Ok(reply),
            Self::DeviceError { code, balance } => Err(code.into_card_error(kind, balance)),
        }
    }
}

/// Decode one notification payload for a pending `kind` command.
///
/// Returns `Ok(None)` for a well-formed object that carries neither an
/// error nor the success marker for `kind`. An `error` field wins over
/// any success marker in the same frame.
///
/// # Errors
///
/// Returns [`FrameError`] when the payload is not a UTF-8 JSON object.
pub fn decode(kind: CommandKind, payload: &[u8]) -> Result<Option<DeviceResponse>, FrameError> {
    let text = std::str::from_utf8(payload).map_err(FrameError::Utf8)?;
    let value: Value = serde_json::from_str(text.trim()).map_err(FrameError::Json)?;
    let Value::Object(frame) = value else {
        return Err(FrameError::NotAnObject);
    };

    let balance = balance_field(&frame, "balance");

    match frame.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(code)) => {
            return Ok(Some(DeviceResponse::DeviceError {
                code: DeviceErrorCode::from_wire(code),
                balance,
            }));
        }
        Some(raw) => {
            return Ok(Some(DeviceResponse::DeviceError {
                code: DeviceErrorCode::Other(raw.to_string()),
                balance,
            }));
        }
    }

    let reply = match kind {
        CommandKind::Read => balance.map(Reply::Balance),
        CommandKind::Init | CommandKind::Recharge => frame
            .get("status")
            .and_then(Value::as_str)
            .filter(|status| status.eq_ignore_ascii_case("SUCCESS"))
            .map(|_| Reply::Updated {
                balance: balance_field(&frame, "updated_balance").or(balance),
                amount: balance_field(&frame, "amount"),
            }),
    };

    Ok(reply.map(DeviceResponse::Success))
}

fn balance_field(frame: &Map<String, Value>, key: &str) -> Option<Balance> {
    frame.get(key).and_then(Balance::from_json)
}
