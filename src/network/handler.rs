//! Connection Handling
//!
//! [`GgpHandler`] is the front door: it owns the admission sequencer,
//! the match session, and the player hooks, and turns one request body
//! into one response body. The transport above it stays trivial.
//!
//! Admission works in two stages. Every connection first waits its turn
//! in the all-queue; at the front it takes the goodness test, which
//! filters out messages for matches this player is not part of so a
//! stale request cannot block the master's next message. Survivors move
//! to the good-queue (joining it before leaving the all-queue, so
//! arrival order is preserved) and are applied to the match session one
//! at a time.

use std::sync::{PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::warn;

use crate::network::player::{
    PlayerHooks, SeesPlayer, SimplePlayer, SimplePlayerAdapter, SimpleSeesPlayer,
    SimpleSeesPlayerAdapter, TurnPlayer,
};
use crate::network::protocol::{self, MessageKind, ProtocolError};
use crate::network::sequencer::AdmissionSequencer;
use crate::network::session::MatchSession;

struct HandlerState {
    session: MatchSession,
    hooks: PlayerHooks,
}

/// One GGP player endpoint: admission ordering plus the match state
/// machine behind it.
pub struct GgpHandler {
    sequencer: AdmissionSequencer,
    /// Mirror of the session's active match id, refreshed after every
    /// processed message. The goodness test reads this instead of the
    /// session lock, so filtering never stalls behind a slow player
    /// callback.
    active_id: RwLock<Option<String>>,
    state: Mutex<HandlerState>,
}

impl GgpHandler {
    fn with_hooks(hooks: PlayerHooks) -> Self {
        Self {
            sequencer: AdmissionSequencer::new(),
            active_id: RwLock::new(None),
            state: Mutex::new(HandlerState {
                session: MatchSession::new(),
                hooks,
            }),
        }
    }

    /// A handler for a GDL-I player using the raw callback surface.
    pub fn standard(player: impl TurnPlayer + 'static) -> Self {
        Self::with_hooks(PlayerHooks::Standard(Box::new(player)))
    }

    /// A handler for a GDL-II player using the raw callback surface.
    pub fn imperfect_information(player: impl SeesPlayer + 'static) -> Self {
        Self::with_hooks(PlayerHooks::ImperfectInformation(Box::new(player)))
    }

    /// A handler for a GDL-I player using the update/select surface.
    pub fn simple(player: impl SimplePlayer + 'static) -> Self {
        Self::standard(SimplePlayerAdapter(player))
    }

    /// A handler for a GDL-II player using the update/select surface.
    pub fn simple_sees(player: impl SimpleSeesPlayer + 'static) -> Self {
        Self::imperfect_information(SimpleSeesPlayerAdapter(player))
    }

    /// Admit one message and produce its response body.
    ///
    /// `arrived_at` must be captured when the transport first saw the
    /// request; queueing time counts against the master's clock, not
    /// the player's.
    pub async fn handle(
        &self,
        arrived_at: Instant,
        body: &str,
    ) -> Result<String, ProtocolError> {
        let mut all_slot = self.sequencer.all.join();
        all_slot.wait().await;

        let good = {
            let active = self
                .active_id
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            is_good_connection(body, active.as_deref())
        };
        if !good {
            drop(all_slot);
            warn!("rejecting connection for a match this player is not playing");
            return Err(ProtocolError::Rejected);
        }

        // Join the good queue before leaving the all queue, or a later
        // arrival could overtake between the two.
        let mut good_slot = self.sequencer.good.join();
        drop(all_slot);
        good_slot.wait().await;

        let result = {
            let mut state = self.state.lock().await;
            let HandlerState { session, hooks } = &mut *state;
            let result = session.handle(arrived_at, body, hooks);
            *self
                .active_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) =
                session.active_match_id().map(String::from);
            result
        };

        drop(good_slot);
        result
    }
}

/// The admission goodness test.
///
/// PREVIEW and START are always admitted (a START mid-match is the
/// master's anomaly to answer for, but blocking it would wedge the
/// player). Anything carrying a recognizable match identifier is
/// admitted only for the active match. Everything else, INFO included,
/// is admitted; deeper validation belongs to the state machine.
fn is_good_connection(body: &str, active_id: Option<&str>) -> bool {
    match MessageKind::recognize(body) {
        Some(MessageKind::Preview) => return true,
        Some(MessageKind::Start) => {
            if active_id.is_some() {
                warn!(
                    "possible game master problem: new START message in the middle of a match"
                );
            }
            return true;
        }
        _ => {}
    }
    match protocol::peek_match_id(body) {
        Some(id) => active_id == Some(id),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Deadline;
    use crate::network::player::MatchStart;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const START: &str = "(START m1 x ((role x) (role o)) 10 2)";

    struct Noop;

    impl SimplePlayer for Noop {
        fn on_update(&mut self, _moves: &[(String, String)]) {}

        fn on_select(&mut self, _deadline: Deadline) -> String {
            "noop".to_string()
        }
    }

    #[test]
    fn test_goodness_rules() {
        assert!(is_good_connection("(PREVIEW ((role r)) 10)", Some("m1")));
        assert!(is_good_connection(START, None));
        assert!(is_good_connection(START, Some("m0")));
        assert!(is_good_connection("(INFO)", Some("m1")));
        assert!(is_good_connection("(PLAY m1 NIL)", Some("m1")));
        assert!(!is_good_connection("(PLAY m0 NIL)", Some("m1")));
        assert!(!is_good_connection("(PLAY m1 NIL)", None));
        assert!(!is_good_connection("(ABORT m0)", Some("m1")));
        // No extractable id defaults to admitted.
        assert!(is_good_connection("(PLAY)", Some("m1")));
        assert!(is_good_connection("nonsense", Some("m1")));
    }

    #[tokio::test]
    async fn test_full_match_through_handler() {
        let handler = GgpHandler::simple(Noop);
        let now = Instant::now();

        assert_eq!(handler.handle(now, START).await.unwrap(), "READY");
        assert_eq!(handler.handle(now, "(PLAY m1 NIL)").await.unwrap(), "noop");
        assert_eq!(
            handler.handle(now, "(PLAY m1 (noop noop))").await.unwrap(),
            "noop"
        );
        assert_eq!(
            handler.handle(now, "(STOP m1 (noop noop))").await.unwrap(),
            "DONE"
        );
        // The match is over; its id no longer admits connections.
        let err = handler.handle(now, "(PLAY m1 NIL)").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected));
    }

    #[tokio::test]
    async fn test_stale_match_is_rejected_without_aborting() {
        struct CountingAborts(Arc<AtomicUsize>);

        impl SimplePlayer for CountingAborts {
            fn on_update(&mut self, _moves: &[(String, String)]) {}

            fn on_select(&mut self, _deadline: Deadline) -> String {
                "noop".to_string()
            }

            fn on_clear(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let aborts = Arc::new(AtomicUsize::new(0));
        let handler = GgpHandler::simple(CountingAborts(aborts.clone()));
        let now = Instant::now();

        handler.handle(now, START).await.unwrap();
        let err = handler.handle(now, "(PLAY stale NIL)").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected));
        // Rejection happens before the state machine; the match and the
        // player are untouched.
        assert_eq!(aborts.load(Ordering::SeqCst), 0);
        assert_eq!(handler.handle(now, "(PLAY m1 NIL)").await.unwrap(), "noop");
    }

    #[tokio::test]
    async fn test_info_admitted_mid_match() {
        let handler = GgpHandler::simple(Noop);
        let now = Instant::now();
        handler.handle(now, START).await.unwrap();
        assert_eq!(handler.handle(now, "(INFO)").await.unwrap(), "BUSY");
    }

    #[tokio::test]
    async fn test_start_mid_match_replaces_the_match() {
        let handler = GgpHandler::simple(Noop);
        let now = Instant::now();
        handler.handle(now, START).await.unwrap();
        assert_eq!(
            handler
                .handle(now, "(START m2 x ((role x) (role o)) 10 2)")
                .await
                .unwrap(),
            "READY"
        );
        assert_eq!(handler.handle(now, "(PLAY m2 NIL)").await.unwrap(), "noop");
    }

    #[tokio::test]
    async fn test_preview_and_abort_overlap_a_match() {
        struct ClearCounter(Arc<AtomicUsize>);

        impl SimplePlayer for ClearCounter {
            fn on_update(&mut self, _moves: &[(String, String)]) {}

            fn on_select(&mut self, _deadline: Deadline) -> String {
                "noop".to_string()
            }

            fn on_clear(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let clears = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(GgpHandler::simple(ClearCounter(clears.clone())));
        handler.handle(Instant::now(), START).await.unwrap();

        // PREVIEW is for a future match; it must pass admission even
        // while the live match is being torn down next to it.
        let preview_handler = handler.clone();
        let preview = tokio::spawn(async move {
            preview_handler
                .handle(Instant::now(), "(PREVIEW ((role r)) 30)")
                .await
        });
        let abort_handler = handler.clone();
        let abort = tokio::spawn(async move {
            abort_handler.handle(Instant::now(), "(ABORT m1)").await
        });

        assert_eq!(preview.await.expect("preview panicked").unwrap(), "DONE");
        assert_eq!(abort.await.expect("abort panicked").unwrap(), "ABORTED");
        assert_eq!(clears.load(Ordering::SeqCst), 1);
        // The aborted match no longer admits its id.
        let err = handler
            .handle(Instant::now(), "(PLAY m1 NIL)")
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_connection_does_not_wedge_the_queue() {
        struct SlowPlayer;

        impl SimplePlayer for SlowPlayer {
            fn on_update(&mut self, _moves: &[(String, String)]) {}

            fn on_select(&mut self, _deadline: Deadline) -> String {
                std::thread::sleep(Duration::from_millis(200));
                "noop".to_string()
            }
        }

        let handler = Arc::new(GgpHandler::simple(SlowPlayer));
        handler.handle(Instant::now(), START).await.unwrap();

        // A slow PLAY holds the good queue...
        let play_handler = handler.clone();
        let play = tokio::spawn(async move {
            play_handler.handle(Instant::now(), "(PLAY m1 NIL)").await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // ...an INFO parks behind it and its client hangs up...
        let doomed_handler = handler.clone();
        let doomed = tokio::spawn(async move {
            doomed_handler.handle(Instant::now(), "(INFO)").await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        doomed.abort();
        let _ = doomed.await;

        // ...and the next connection must still get through.
        let response = tokio::time::timeout(
            Duration::from_secs(2),
            handler.handle(Instant::now(), "(INFO)"),
        )
        .await
        .expect("handler wedged behind an abandoned connection")
        .unwrap();
        assert_eq!(response, "BUSY");
        play.await.expect("play panicked").unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejection_does_not_wait_for_a_running_handler() {
        struct SlowPlayer;

        impl SimplePlayer for SlowPlayer {
            fn on_update(&mut self, _moves: &[(String, String)]) {}

            fn on_select(&mut self, _deadline: Deadline) -> String {
                std::thread::sleep(Duration::from_millis(400));
                "noop".to_string()
            }
        }

        let handler = Arc::new(GgpHandler::simple(SlowPlayer));
        handler.handle(Instant::now(), START).await.unwrap();

        let play_handler = handler.clone();
        let play = tokio::spawn(async move {
            play_handler.handle(Instant::now(), "(PLAY m1 NIL)").await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Filtering a stale connection must not wait for the player
        // callback in flight.
        let started = Instant::now();
        let err = handler
            .handle(Instant::now(), "(PLAY stale NIL)")
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Rejected));
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "rejection stalled behind the running handler: {:?}",
            started.elapsed()
        );
        play.await.expect("play panicked").unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialized() {
        struct SlowPlayer;

        impl SimplePlayer for SlowPlayer {
            fn on_update(&mut self, _moves: &[(String, String)]) {}

            fn on_select(&mut self, _deadline: Deadline) -> String {
                std::thread::sleep(Duration::from_millis(2));
                "noop".to_string()
            }
        }

        let handler = Arc::new(GgpHandler::simple(SlowPlayer));
        handler.handle(Instant::now(), START).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                handler.handle(Instant::now(), "(INFO)").await
            }));
        }
        for task in tasks {
            let response = task.await.expect("handler task panicked").unwrap();
            assert_eq!(response, "BUSY");
        }
    }

    #[tokio::test]
    async fn test_raw_player_constructor() {
        struct Raw;

        impl crate::network::player::GamePlayer for Raw {
            fn on_start(&mut self, _deadline: Deadline, _start: &MatchStart) {}
            fn on_abort(&mut self) {}
        }

        impl TurnPlayer for Raw {
            fn on_play(&mut self, _deadline: Deadline, _moves: &[(String, String)]) -> String {
                "raw-move".to_string()
            }

            fn on_stop(&mut self, _deadline: Deadline, _moves: &[(String, String)]) {}
        }

        let handler = GgpHandler::standard(Raw);
        let now = Instant::now();
        handler.handle(now, START).await.unwrap();
        assert_eq!(
            handler.handle(now, "(PLAY m1 NIL)").await.unwrap(),
            "raw-move"
        );
    }
}
