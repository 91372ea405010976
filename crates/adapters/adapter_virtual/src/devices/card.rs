//! Virtual card slot — answers commands the way the reader firmware does.

use serde::Deserialize;
use serde_json::{Value, json};

const INIT_MINIMUM: i64 = 200;
const FIRST_RECHARGE_MINIMUM: i64 = 25;

/// A card lying on the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedCard {
    pub initialized: bool,
    pub balance: i64,
    pub recharges: u32,
}

impl SimulatedCard {
    /// A card that has never been initialized.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            initialized: false,
            balance: 0,
            recharges: 0,
        }
    }

    /// An initialized card that has been recharged before.
    #[must_use]
    pub fn with_balance(balance: i64) -> Self {
        Self {
            initialized: true,
            balance,
            recharges: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Request {
    command: String,
    #[serde(default)]
    amount: i64,
}

/// The reader's card slot plus fault injection.
#[derive(Debug, Default)]
pub struct CardSlot {
    card: Option<SimulatedCard>,
    fault: Option<String>,
    silent: bool,
}

impl CardSlot {
    #[must_use]
    pub fn with_card(card: SimulatedCard) -> Self {
        Self {
            card: Some(card),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, card: SimulatedCard) {
        self.card = Some(card);
    }

    pub fn remove(&mut self) -> Option<SimulatedCard> {
        self.card.take()
    }

    #[must_use]
    pub fn card(&self) -> Option<&SimulatedCard> {
        self.card.as_ref()
    }

    /// Answer the next command with `{"error": code}` whatever it is.
    pub fn fail_next(&mut self, code: impl Into<String>) {
        self.fault = Some(code.into());
    }

    /// Stop answering commands (writes are still acknowledged).
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Process one written payload, returning the notification to send.
    pub fn handle(&mut self, payload: &[u8]) -> Option<Value> {
        if self.silent {
            return None;
        }
        let request: Request = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(%err, "virtual reader ignoring malformed request");
                return None;
            }
        };
        if let Some(code) = self.fault.take() {
            return Some(json!({ "error": code }));
        }
        let Some(card) = self.card.as_mut() else {
            return Some(error("NO_CARD"));
        };

        let reply = match request.command.as_str() {
            "READ" if card.initialized => json!({ "balance": card.balance }),
            "READ" => error("NOT_INIT"),
            "INIT" if card.initialized => {
                json!({ "error": "ALREADY_INIT", "balance": card.balance })
            }
            "INIT" if request.amount < INIT_MINIMUM => error("MIN_200"),
            "INIT" => {
                card.initialized = true;
                card.balance = request.amount;
                success(card.balance)
            }
            "RECHARGE" if !card.initialized => error("NOT_INIT"),
            "RECHARGE" if request.amount <= 0 => error("INVALID_AMOUNT"),
            "RECHARGE" if card.recharges == 0 && request.amount < FIRST_RECHARGE_MINIMUM => {
                error("MIN_25_FIRST")
            }
            "RECHARGE" => {
                card.balance += request.amount;
                card.recharges += 1;
                success(card.balance)
            }
            other => {
                tracing::warn!(command = other, "virtual reader got unknown command");
                error("UNKNOWN_COMMAND")
            }
        };
        Some(reply)
    }
}

fn error(code: &str) -> Value {
    json!({ "error": code })
}

fn success(balance: i64) -> Value {
    json!({ "status": "SUCCESS", "updated_balance": balance })
}
