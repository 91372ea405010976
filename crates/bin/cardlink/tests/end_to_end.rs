//! End-to-end tests for the full cardlink stack.
//!
//! Each test wires the real connection manager, protocol engine and card
//! services to the simulated reader and in-memory ledger. No radio is used.

use std::sync::Arc;
use std::time::Duration;

use cardlink_adapter_virtual::{InMemoryLedger, SimulatedCard, VirtualCardReader};
use cardlink_app::event_bus::InProcessEventBus;
use cardlink_app::lifecycle::{ConnectionManager, LinkState};
use cardlink_app::ports::Discovery;
use cardlink_app::protocol::{EngineConfig, ProtocolEngine};
use cardlink_app::services::card_service::{CardLimits, CardService};
use cardlink_app::services::history::TransactionLog;
use cardlink_app::services::wallet_service::{WalletOutcome, WalletService};
use cardlink_domain::amount::Balance;
use cardlink_domain::error::{CardError, CommunicationFailure};
use cardlink_domain::event::ConnectionEventKind;
use cardlink_domain::peer::{DEFAULT_NAME_PREFIX, PeerId};
use cardlink_domain::transaction::LedgerStatus;
use tokio::sync::oneshot;

const MACHINE_NO: &str = "1001";

type Manager = ConnectionManager<Arc<VirtualCardReader>, InProcessEventBus>;

struct Stack {
    reader: Arc<VirtualCardReader>,
    events: InProcessEventBus,
    manager: Arc<Manager>,
    wallet: WalletService<Manager, Arc<InMemoryLedger>>,
    ledger: Arc<InMemoryLedger>,
}

impl Stack {
    fn new() -> Self {
        Self::with_engine(EngineConfig::default())
    }

    fn with_engine(config: EngineConfig) -> Self {
        let reader = Arc::new(VirtualCardReader::new(MACHINE_NO));
        let events = InProcessEventBus::new(16);
        let manager = Arc::new(ConnectionManager::new(Arc::clone(&reader), events.clone()));
        let cards = Arc::new(CardService::new(
            Arc::clone(&manager),
            ProtocolEngine::new(config),
            CardLimits::default(),
        ));
        let ledger = Arc::new(InMemoryLedger::new().with_machine(MACHINE_NO, 0));
        let wallet = WalletService::new(
            cards,
            Arc::clone(&ledger),
            Arc::new(TransactionLog::new()),
        );
        Self {
            reader,
            events,
            manager,
            wallet,
            ledger,
        }
    }

    async fn connect(&self) {
        self.manager
            .connect(&self.reader.peer().id)
            .await
            .expect("virtual reader should accept the connection");
    }

    fn cards(&self) -> &CardService<Manager> {
        self.wallet.cards()
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_find_reader_and_derive_machine_number() {
    let stack = Stack::new();

    let peers = stack.reader.scan_all(Duration::from_secs(1)).await.unwrap();

    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].machine_no(DEFAULT_NAME_PREFIX), Some(MACHINE_NO));
}

// ---------------------------------------------------------------------------
// Card operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_fail_with_no_device_before_connecting() {
    let stack = Stack::new();

    let err = stack.cards().read_balance().await.unwrap_err();

    assert_eq!(err, CardError::NoDevice);
}

#[tokio::test]
async fn should_read_balance_of_inserted_card() {
    let stack = Stack::new();
    stack.connect().await;

    assert_eq!(stack.cards().read_balance().await.unwrap(), Balance::new(600));
}

#[tokio::test]
async fn should_recharge_card_and_credit_ledger() {
    let stack = Stack::new();
    stack.connect().await;

    let outcome = stack.wallet.recharge(MACHINE_NO, 100).await.unwrap();

    assert!(matches!(outcome, WalletOutcome::Reconciled { .. }));
    assert_eq!(outcome.update().balance, Some(Balance::new(700)));
    assert_eq!(outcome.transaction().ledger, LedgerStatus::Synced);
    assert_eq!(stack.ledger.wallet(MACHINE_NO), Some(100));
    assert_eq!(stack.wallet.history().total_loaded(MACHINE_NO), 100);
}

#[tokio::test]
async fn should_initialize_blank_card() {
    let stack = Stack::new();
    stack.reader.slot().insert(SimulatedCard::blank());
    stack.connect().await;

    let outcome = stack.wallet.initialize(MACHINE_NO, 500).await.unwrap();

    assert_eq!(outcome.update().balance, Some(Balance::new(500)));
    assert_eq!(stack.reader.slot().card().unwrap().balance, 500);
    assert_eq!(stack.ledger.wallet(MACHINE_NO), Some(500));
}

#[tokio::test]
async fn should_report_existing_balance_when_card_already_initialized() {
    let stack = Stack::new();
    stack.reader.slot().insert(SimulatedCard::with_balance(150));
    stack.connect().await;

    let err = stack.wallet.initialize(MACHINE_NO, 300).await.unwrap_err();

    assert_eq!(
        err,
        CardError::CardAlreadyInitialized {
            balance: Some(Balance::new(150))
        }
    );
    assert_eq!(stack.ledger.wallet(MACHINE_NO), Some(0));
    assert!(stack.wallet.history().list().is_empty());
}

#[tokio::test]
async fn should_reject_invalid_amounts_without_touching_the_card() {
    let stack = Stack::new();
    stack.reader.slot().insert(SimulatedCard::blank());
    stack.connect().await;

    for amount in [0, -5, 150] {
        let err = stack.wallet.initialize(MACHINE_NO, amount).await.unwrap_err();
        assert!(matches!(err, CardError::InvalidAmount(_)), "{amount}: {err:?}");
    }

    let card = stack.reader.slot().card().cloned().unwrap();
    assert!(!card.initialized);
    assert_eq!(card.balance, 0);
    assert_eq!(stack.ledger.wallet(MACHINE_NO), Some(0));
}

#[tokio::test]
async fn should_map_device_errors() {
    let stack = Stack::new();
    stack.connect().await;

    stack.reader.slot().remove();
    assert_eq!(
        stack.cards().recharge_card(50).await.unwrap_err(),
        CardError::NoCardDetected
    );

    stack.reader.slot().insert(SimulatedCard::blank());
    assert_eq!(
        stack.cards().recharge_card(50).await.unwrap_err(),
        CardError::CardNotInitialized
    );

    stack.reader.slot().fail_next("WRITE_FAIL");
    assert_eq!(
        stack.cards().initialize_card(400).await.unwrap_err(),
        CardError::CardWriteFailed
    );
}

#[tokio::test]
async fn should_keep_card_update_when_ledger_is_offline() {
    let stack = Stack::new();
    stack.connect().await;
    stack.ledger.set_offline(true);

    let outcome = stack.wallet.recharge(MACHINE_NO, 100).await.unwrap();

    assert!(matches!(outcome, WalletOutcome::LedgerSyncFailed { .. }));
    assert_eq!(outcome.update().balance, Some(Balance::new(700)));
    assert_eq!(outcome.transaction().ledger, LedgerStatus::Pending);
    assert_eq!(stack.reader.slot().card().unwrap().balance, 700);
}

#[tokio::test(start_paused = true)]
async fn should_time_out_when_reader_stays_silent() {
    let stack = Stack::with_engine(EngineConfig {
        command_timeout: Some(Duration::from_secs(5)),
    });
    stack.connect().await;
    stack.reader.slot().set_silent(true);

    let err = stack.cards().read_balance().await.unwrap_err();

    assert_eq!(
        err,
        CardError::CommunicationFailed(CommunicationFailure::Timeout)
    );
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_not_fire_monitor_on_requested_disconnect() {
    let stack = Stack::new();
    stack.connect().await;
    let (tx, mut rx) = oneshot::channel::<PeerId>();
    stack.manager.monitor(move |peer| {
        let _ = tx.send(peer);
    });

    stack.manager.disconnect().await;
    tokio::task::yield_now().await;

    assert_eq!(stack.manager.state(), LinkState::Absent);
    assert!(!stack.reader.is_linked());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn should_fire_monitor_once_when_link_drops() {
    let stack = Stack::new();
    let mut events = stack.events.subscribe();
    stack.connect().await;
    let (tx, rx) = oneshot::channel::<PeerId>();
    stack.manager.monitor(move |peer| {
        let _ = tx.send(peer);
    });

    stack.reader.drop_link();

    let peer = tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .expect("monitor should fire")
        .unwrap();
    assert_eq!(peer, stack.reader.peer().id);
    assert!(stack.manager.current_session().is_none());
    assert_eq!(
        stack.cards().read_balance().await.unwrap_err(),
        CardError::NoDevice
    );

    assert_eq!(
        events.recv().await.unwrap().kind,
        ConnectionEventKind::Connected
    );
    assert_eq!(
        events.recv().await.unwrap().kind,
        ConnectionEventKind::Dropped
    );
}

#[tokio::test]
async fn should_serve_commands_again_after_reconnect() {
    let stack = Stack::new();
    stack.connect().await;
    stack.reader.drop_link();
    tokio::time::timeout(Duration::from_secs(1), async {
        while stack.manager.current_session().is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("drop should be noticed");

    stack.connect().await;

    assert_eq!(stack.cards().read_balance().await.unwrap(), Balance::new(600));
    assert_eq!(stack.reader.connect_count(), 2);
}

#[tokio::test]
async fn should_fail_pending_command_when_disconnected() {
    let stack = Arc::new(Stack::with_engine(EngineConfig {
        command_timeout: None,
    }));
    stack.connect().await;
    stack.reader.slot().set_silent(true);

    let call = tokio::spawn({
        let stack = Arc::clone(&stack);
        async move { stack.cards().read_balance().await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    stack.manager.disconnect().await;

    let err = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .expect("pending command should resolve on disconnect")
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code(), "BLE_ERROR");
    assert_eq!(stack.manager.state(), LinkState::Absent);
}
