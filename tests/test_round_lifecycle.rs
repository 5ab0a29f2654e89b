use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use skirmish::config::{GameConfig, RevealCase, SideConfig, StrategyKind};
use skirmish::engine::{self, EngineHandle, EngineParts, Notification, Notifier, Phase};
use skirmish::ledger::{AuditLedger, MemorySink, verify_chain};
use skirmish::players::{PlayerId, PlayerRegistry, Wallet};

#[derive(Default)]
struct Collector {
    seen: Mutex<Vec<(Option<PlayerId>, Notification)>>,
}

impl Collector {
    fn broadcast_events(&self) -> Vec<&'static str> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to.is_none())
            .map(|(_, n)| n.event())
            .collect()
    }

    fn count(&self, event: &str) -> usize {
        self.broadcast_events().iter().filter(|e| **e == event).count()
    }

    fn last_result(&self) -> Option<Notification> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, n)| n.event() == "round_result")
            .map(|(_, n)| n.clone())
    }
}

impl Notifier for Collector {
    fn broadcast(&self, notification: &Notification) {
        self.seen.lock().unwrap().push((None, notification.clone()));
    }

    fn send_to(&self, player: PlayerId, notification: &Notification) {
        self.seen
            .lock()
            .unwrap()
            .push((Some(player), notification.clone()));
    }
}

struct Harness {
    engine: EngineHandle,
    collector: Arc<Collector>,
    players: Arc<PlayerRegistry>,
    journal: AuditLedger,
    sink: Arc<MemorySink>,
    cancel: CancellationToken,
}

fn start(config: GameConfig) -> Harness {
    let players = Arc::new(PlayerRegistry::new(&config.players));
    let collector = Arc::new(Collector::default());
    let (journal, sink) = AuditLedger::in_memory(500);
    let cancel = CancellationToken::new();
    let (engine, _task) = engine::spawn(
        EngineParts {
            config: Arc::new(config),
            players: Arc::clone(&players),
            notifier: collector.clone(),
            journal: journal.clone(),
        },
        cancel.clone(),
    );
    Harness {
        engine,
        collector,
        players,
        journal,
        sink,
        cancel,
    }
}

fn seeded(strategy: StrategyKind) -> GameConfig {
    let mut config = GameConfig::default();
    config.battle.strategy = strategy;
    config.battle.seed = Some(2024);
    config
}

async fn wait_for_phase(engine: &EngineHandle, phase: Phase) {
    for _ in 0..600 {
        if engine.snapshot().await.unwrap().state.phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("phase {phase} never reached");
}

#[tokio::test(start_paused = true)]
async fn attrition_round_broadcasts_in_order() {
    let h = start(seeded(StrategyKind::Attrition));
    h.engine.start_round(None);
    wait_for_phase(&h.engine, Phase::Ended).await;

    let events = h.collector.broadcast_events();
    let position = |name: &str| events.iter().position(|e| *e == name).unwrap();
    assert!(position("round_created") < position("betting_open"));
    assert!(position("betting_open") < position("betting_tick"));
    assert!(position("betting_tick") < position("betting_closed"));
    assert!(position("betting_closed") < position("battle_start"));
    assert!(position("battle_start") < position("battle_tick"));
    assert!(position("battle_tick") < position("round_result"));
    assert_eq!(h.collector.count("round_result"), 1);
    assert_eq!(h.collector.count("betting_closed"), 1);

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn slot_reveal_round_finishes_within_window() {
    let h = start(seeded(StrategyKind::SlotReveal));
    h.engine.start_round(None);

    // betting (3s) + start delay (1s) + reveal window (3s), with slack
    tokio::time::sleep(Duration::from_secs(10)).await;
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.state.phase, Phase::Ended);
    let winner = snapshot.state.winner.unwrap();
    assert!(["gold", "silver", "bronze"].contains(&winner.as_str()));
    assert!(h.collector.count("battle_tick") >= 1);

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn reveal_cases_run_back_to_back() {
    let mut config = seeded(StrategyKind::SlotReveal);
    config.battle.cases = [("case1", 9), ("case2", 1), ("case3", 0)]
        .into_iter()
        .map(|(key, filler)| RevealCase {
            key: key.to_string(),
            slots: [("gold", 2), ("silver", 4), ("bronze", 5)]
                .into_iter()
                .map(|(side, n)| (side.to_string(), n))
                .collect(),
            filler,
        })
        .collect();
    let h = start(config);
    h.engine.start_round(None);

    // betting (3s) + start delay (1s) + three reveal windows (3s each)
    tokio::time::sleep(Duration::from_secs(16)).await;
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.state.phase, Phase::Ended);
    assert_eq!(h.collector.count("case_result"), 3);
    assert_eq!(h.collector.count("case_start"), 2);
    assert_eq!(h.collector.count("final_round_result"), 1);

    let events = h.collector.broadcast_events();
    let result = events.iter().position(|e| *e == "round_result").unwrap();
    let summary = events.iter().position(|e| *e == "final_round_result").unwrap();
    assert_eq!(summary, result + 1);

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn winning_and_losing_bets_settle() {
    let mut config = seeded(StrategyKind::SlotReveal);
    config.sides = vec![
        SideConfig {
            name: "gold".to_string(),
            health: 100,
            slots: 1,
        },
        SideConfig {
            name: "silver".to_string(),
            health: 100,
            slots: 1,
        },
    ];
    let h = start(config);
    let on_gold = h.players.register().id;
    let on_silver = h.players.register().id;

    h.engine.start_round(None);
    h.engine.place_bet(on_gold, "gold", 100.0);
    h.engine.place_bet(on_silver, "silver", 100.0);
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.bets.bets.len(), 2);
    assert_eq!(snapshot.state.totals["gold"], 100.0);

    wait_for_phase(&h.engine, Phase::Ended).await;
    let Some(Notification::RoundResult(result)) = h.collector.last_result() else {
        panic!("no round_result");
    };
    let winner = result.winner.unwrap();
    let (won, lost) = if winner == "gold" {
        (on_gold, on_silver)
    } else {
        (on_silver, on_gold)
    };

    // Equal slot weights: multiplier 2.
    assert_eq!(result.settlement[&won].change, 200.0);
    assert_eq!(result.settlement[&lost].change, 0.0);
    assert_eq!(h.players.balance(won), Some(1100.0));
    assert_eq!(h.players.balance(lost), Some(900.0));

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn rejected_bet_reaches_only_its_sender() {
    let h = start(seeded(StrategyKind::Attrition));
    let player = h.players.register().id;

    h.engine.start_round(None);
    h.engine.place_bet(player, "gld", 10.0);
    h.engine.snapshot().await.unwrap();

    let direct: Vec<Notification> = h
        .collector
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|(to, _)| *to == Some(player))
        .map(|(_, n)| n.clone())
        .collect();
    assert_eq!(direct.len(), 1);
    match &direct[0] {
        Notification::Error { code, message } => {
            assert_eq!(*code, "invalid_side");
            assert!(message.contains("gold"), "{message}");
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(h.players.balance(player), Some(1000.0));

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn cooldown_starts_next_round() {
    let mut config = seeded(StrategyKind::SlotReveal);
    config.round.cooldown = Some(2);
    let h = start(config);

    h.engine.start_round(None);
    wait_for_phase(&h.engine, Phase::Ended).await;
    let first = h.engine.snapshot().await.unwrap().state.round_id;

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.state.phase, Phase::Betting);
    assert_ne!(snapshot.state.round_id, first);
    assert_eq!(h.collector.count("cooldown_tick"), 1);
    assert_eq!(h.collector.count("round_created"), 2);

    h.cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn journal_records_round_and_verifies() {
    let h = start(seeded(StrategyKind::SlotReveal));
    let player = h.players.register().id;

    h.engine.start_round(None);
    h.engine.place_bet(player, "silver", 25.0);
    wait_for_phase(&h.engine, Phase::Ended).await;

    h.journal.seal_all();
    let blocks = h.sink.blocks();
    let kinds: Vec<String> = blocks
        .iter()
        .flat_map(|b| b.txs.iter().map(|tx| tx.kind.clone()))
        .collect();
    for kind in ["bet_placed", "battle_start", "battle_tick", "round_result"] {
        assert!(kinds.iter().any(|k| k == kind), "missing {kind} in {kinds:?}");
    }
    verify_chain(&blocks).unwrap();

    h.cancel.cancel();
}
