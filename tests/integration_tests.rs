//! Integration tests for the game authority
//!
//! These tests drive whole games through the public session authority API and
//! exercise the real UDP front end.

use server::authority::{Outcome, Recipients, SessionAuthority};
use server::clock::FixedClock;
use server::config::GameConfig;
use server::game::Game;
use server::persistence::{load_saved_game, MemoryStore, SnapshotStore};
use server::roles::RoleAssigner;
use shared::{
    ClientAction, ConnectionId, ErrorKind, Faction, Phase, PlayerId, ServerEvent,
};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const SECRET: &str = "mc-secret";
const ADMIN: ConnectionId = ConnectionId(1000);

/// A table of players sitting around one authority, with every persistence
/// operation applied to an in-memory store as the network loop would.
struct Table {
    authority: SessionAuthority,
    store: Arc<MemoryStore>,
}

fn new_game(seed: u64) -> Game {
    let config = GameConfig::default();
    Game::new(
        config.clone(),
        RoleAssigner::seeded(seed, config.traitor_count, config.min_players),
        Arc::new(FixedClock::at(23, 30)),
    )
}

impl Table {
    fn with_players(n: u32) -> Self {
        let mut table = Table {
            authority: SessionAuthority::new(new_game(42), SECRET),
            store: Arc::new(MemoryStore::new()),
        };
        table.act(
            ADMIN,
            ClientAction::AdminLogin {
                secret: SECRET.to_string(),
            },
        );
        for i in 1..=n {
            let outcome = table.act(
                ConnectionId(i),
                ClientAction::Join {
                    display_name: format!("guest{}", i),
                    avatar: format!("avatar{}.png", i),
                },
            );
            assert!(rejection(&outcome).is_none());
        }
        table
    }

    fn started(n: u32) -> Self {
        let mut table = Self::with_players(n);
        let outcome = table.act(ConnectionId(1), ClientAction::StartGame);
        assert!(rejection(&outcome).is_none());
        table
    }

    /// Started game moved by the admin to the night of day 2.
    fn at_night_two(n: u32) -> Self {
        let mut table = Self::started(n);
        table.act(ADMIN, ClientAction::AdminNextDay);
        assert_eq!(table.phase(), Phase::Night);
        assert_eq!(table.authority.game().day(), 2);
        table
    }

    fn act(&mut self, connection: ConnectionId, action: ClientAction) -> Outcome {
        let outcome = self.authority.handle(connection, action);
        for op in &outcome.persistence {
            op.apply_logged(self.store.as_ref());
        }
        outcome
    }

    fn as_player(&mut self, player: PlayerId, action: ClientAction) -> Outcome {
        let connection = self
            .authority
            .game()
            .roster()
            .connection_of(player)
            .unwrap();
        self.act(connection, action)
    }

    fn phase(&self) -> Phase {
        self.authority.game().phase()
    }

    fn traitors(&self) -> Vec<PlayerId> {
        self.by_faction(Faction::Traitor)
    }

    fn faithful(&self) -> Vec<PlayerId> {
        self.by_faction(Faction::Faithful)
    }

    fn by_faction(&self, faction: Faction) -> Vec<PlayerId> {
        self.authority
            .game()
            .roster()
            .iter()
            .filter(|p| p.faction == faction)
            .map(|p| p.id)
            .collect()
    }

    fn living(&self) -> Vec<PlayerId> {
        self.authority
            .game()
            .roster()
            .living_players()
            .map(|p| p.id)
            .collect()
    }

    fn is_alive(&self, id: PlayerId) -> bool {
        self.authority.game().roster().is_alive(id)
    }

    /// Kills the first faithful player during the night of day 2.
    fn kill_first_faithful(&mut self) -> PlayerId {
        let traitor = self.traitors()[0];
        let victim = self.faithful()[0];
        let outcome = self.as_player(traitor, ClientAction::NightKill { victim });
        assert!(rejection(&outcome).is_none());
        victim
    }
}

fn rejection(outcome: &Outcome) -> Option<ErrorKind> {
    outcome.deliveries.iter().find_map(|d| match d.event {
        ServerEvent::Rejected { kind, .. } => Some(kind),
        _ => None,
    })
}

fn broadcast(outcome: &Outcome) -> Vec<&ServerEvent> {
    outcome.events_for(&Recipients::All)
}

/// ROLE ASSIGNMENT AND START
mod start_tests {
    use super::*;

    #[test]
    fn roles_partition_every_roster_size() {
        for n in 4..=12 {
            let table = Table::started(n);
            let state = table.authority.game().state();

            assert_eq!(state.traitor_ids.len(), 2, "roster of {}", n);
            assert!(state.traitor_ids.is_disjoint(&state.faithful_ids));
            assert_eq!(
                state.traitor_ids.len() + state.faithful_ids.len(),
                n as usize
            );
        }
    }

    #[test]
    fn start_with_three_players_fails_and_stays_waiting() {
        let mut table = Table::with_players(3);
        let outcome = table.act(ConnectionId(2), ClientAction::StartGame);

        assert_eq!(rejection(&outcome), Some(ErrorKind::ValidationFailure));
        assert_eq!(table.phase(), Phase::Waiting);
        assert_eq!(table.authority.game().day(), 0);
    }

    #[test]
    fn late_join_is_refused() {
        let mut table = Table::started(4);
        let outcome = table.act(
            ConnectionId(77),
            ClientAction::Join {
                display_name: "latecomer".to_string(),
                avatar: String::new(),
            },
        );

        assert_eq!(rejection(&outcome), Some(ErrorKind::IllegalAction));
        assert_eq!(table.authority.game().roster().len(), 4);
    }
}

/// NIGHT AND ROUNDTABLE RESOLUTION
mod resolution_tests {
    use super::*;

    #[test]
    fn first_night_is_protected() {
        let mut table = Table::started(6);
        let traitor = table.traitors()[0];
        let target = table.faithful()[0];
        table.as_player(traitor, ClientAction::Invite { target });
        table.as_player(target, ClientAction::RespondInvitation { accept: false });
        assert_eq!(table.phase(), Phase::Night);

        let victim = table.faithful()[1];
        let outcome = table.as_player(traitor, ClientAction::NightKill { victim });

        assert_eq!(rejection(&outcome), Some(ErrorKind::IllegalAction));
        assert!(table.is_alive(victim));
        assert_eq!(table.phase(), Phase::Night);
    }

    #[test]
    fn night_kill_is_announced_and_opens_roundtable() {
        let mut table = Table::at_night_two(6);
        let traitor = table.traitors()[0];
        let victim = table.faithful()[0];

        let outcome = table.as_player(traitor, ClientAction::NightKill { victim });

        let public = broadcast(&outcome);
        assert!(public.iter().any(|e| matches!(
            e,
            ServerEvent::NightVictimAnnounced { victim: v } if v.id == victim && !v.alive
        )));
        assert!(public.contains(&&ServerEvent::PhaseChanged {
            phase: Phase::Roundtable
        }));
        assert_eq!(table.phase(), Phase::Roundtable);
    }

    #[test]
    fn split_vote_two_two_one_eliminates_nobody() {
        let mut table = Table::at_night_two(6);
        table.kill_first_faithful();
        let voters = table.living();
        assert_eq!(voters.len(), 5);
        let (a, b, c) = (voters[0], voters[1], voters[2]);

        for (voter, target) in voters.iter().zip([a, a, b, b]) {
            table.as_player(*voter, ClientAction::CastVote { target });
        }
        // four of five ballots in: the round stays open
        assert_eq!(table.phase(), Phase::Roundtable);
        assert_eq!(table.authority.game().votes().len(), 4);

        let outcome = table.as_player(voters[4], ClientAction::CastVote { target: c });

        assert!(broadcast(&outcome).contains(&&ServerEvent::VoteTied));
        assert!(!broadcast(&outcome)
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerEliminated { .. })));
        assert_eq!(table.living().len(), 5);
        assert_eq!(table.phase(), Phase::Night);
        assert!(table.authority.game().votes().is_empty());
    }

    #[test]
    fn three_to_two_vote_eliminates_the_leader() {
        let mut table = Table::at_night_two(6);
        table.kill_first_faithful();
        let voters = table.living();
        let a = table.traitors()[0];
        let b = table.faithful()[1];

        let mut last = None;
        for (voter, target) in voters.iter().zip([a, a, a, b, b]) {
            last = Some(table.as_player(*voter, ClientAction::CastVote { target }));
        }
        let outcome = last.unwrap();

        assert!(broadcast(&outcome).iter().any(|e| matches!(
            e,
            ServerEvent::PlayerEliminated { player } if player.id == a
        )));
        assert!(!table.is_alive(a));
        assert!(table.is_alive(b));
        // one traitor against three faithful: the game goes on
        assert_eq!(table.phase(), Phase::Night);
    }

    #[test]
    fn vote_progress_is_broadcast() {
        let mut table = Table::at_night_two(6);
        table.kill_first_faithful();
        let voters = table.living();

        let outcome = table.as_player(voters[0], ClientAction::CastVote { target: voters[1] });

        assert!(broadcast(&outcome).contains(&&ServerEvent::VoteRecorded {
            votes_cast: 1,
            votes_needed: 5
        }));
    }
}

/// WIN CONDITIONS
mod game_over_tests {
    use super::*;

    #[test]
    fn parity_after_night_kill_is_traitor_win() {
        // 2 traitors and 3 faithful; the kill leaves 2 against 2
        let mut table = Table::at_night_two(5);
        let outcome = {
            let traitor = table.traitors()[0];
            let victim = table.faithful()[0];
            table.as_player(traitor, ClientAction::NightKill { victim })
        };

        assert_eq!(table.phase(), Phase::GameOver);
        assert!(broadcast(&outcome).contains(&&ServerEvent::GameOver {
            winner: Faction::Traitor
        }));

        let voter = table.living()[0];
        let rejected = table.as_player(voter, ClientAction::CastVote { target: voter });
        assert_eq!(rejection(&rejected), Some(ErrorKind::IllegalAction));
    }

    #[test]
    fn expelling_both_traitors_is_faithful_win() {
        let mut table = Table::at_night_two(8);
        table.kill_first_faithful();
        let [t1, t2] = [table.traitors()[0], table.traitors()[1]];

        // first roundtable expels one traitor
        for voter in table.living() {
            table.as_player(voter, ClientAction::CastVote { target: t1 });
        }
        assert_eq!(table.phase(), Phase::Night);

        // next night, then the second traitor goes
        let victim = table.faithful()[1];
        table.as_player(t2, ClientAction::NightKill { victim });
        assert_eq!(table.phase(), Phase::Roundtable);
        let mut last = None;
        for voter in table.living() {
            last = Some(table.as_player(voter, ClientAction::CastVote { target: t2 }));
        }

        assert_eq!(table.phase(), Phase::GameOver);
        assert_eq!(
            table.authority.game().state().winner,
            Some(Faction::Faithful)
        );
        assert!(broadcast(&last.unwrap()).contains(&&ServerEvent::GameOver {
            winner: Faction::Faithful
        }));
    }

    #[test]
    fn running_out_the_days_is_faithful_win() {
        let mut table = Table::started(8);
        for _ in 0..3 {
            table.act(ADMIN, ClientAction::AdminNextDay);
        }

        assert_eq!(table.authority.game().day(), 4);
        assert_eq!(table.phase(), Phase::GameOver);
        assert_eq!(
            table.authority.game().state().winner,
            Some(Faction::Faithful)
        );

        let outcome = table.act(ADMIN, ClientAction::AdminNextDay);
        assert_eq!(rejection(&outcome), Some(ErrorKind::IllegalAction));
    }
}

/// RECONNECTION AND PERSISTENCE
mod continuity_tests {
    use super::*;

    #[test]
    fn reconnect_preserves_player_mid_roundtable() {
        let mut table = Table::at_night_two(6);
        table.kill_first_faithful();
        let traitor = table.traitors()[1];
        let (token, old) = {
            let player = table.authority.game().roster().get(traitor).unwrap();
            (player.token.clone(), player.connection.unwrap())
        };
        table.act(
            ADMIN,
            ClientAction::AdminAwardPoints {
                targets: vec![traitor],
                amount: 3,
            },
        );

        table.authority.disconnect(old);
        let outcome = table.act(ConnectionId(500), ClientAction::Reconnect { token });

        let player = table.authority.game().roster().get(traitor).unwrap();
        assert_eq!(player.connection, Some(ConnectionId(500)));
        assert_eq!(player.faction, Faction::Traitor);
        assert!(player.alive);
        assert_eq!(player.score, 3);
        assert!(table.authority.game().is_traitor(traitor));
        assert!(outcome
            .events_for(&Recipients::Connection(ConnectionId(500)))
            .iter()
            .any(|e| matches!(
                e,
                ServerEvent::Reconnected { phase: Phase::Roundtable, day: 2, .. }
            )));

        let target = table.faithful()[1];
        let vote = table.act(ConnectionId(500), ClientAction::CastVote { target });
        assert!(rejection(&vote).is_none());
        assert_eq!(table.authority.game().votes().vote_of(traitor), Some(target));
    }

    #[test]
    fn invited_player_answers_from_a_new_connection() {
        let mut table = Table::started(6);
        let traitor = table.traitors()[0];
        let target = table.faithful()[0];
        table.as_player(traitor, ClientAction::Invite { target });
        let (token, old) = {
            let player = table.authority.game().roster().get(target).unwrap();
            (player.token.clone(), player.connection.unwrap())
        };

        let outcome = table.act(ConnectionId(700), ClientAction::Reconnect { token });

        assert!(outcome
            .events_for(&Recipients::Connection(ConnectionId(700)))
            .contains(&&ServerEvent::InvitationOffered));
        assert_eq!(
            table
                .authority
                .game()
                .state()
                .pending_invitation
                .as_ref()
                .map(|p| p.target),
            Some(target)
        );

        let stale = table.act(old, ClientAction::RespondInvitation { accept: true });
        assert_eq!(rejection(&stale), Some(ErrorKind::IllegalAction));
        assert_eq!(table.phase(), Phase::Invitation);

        let answer = table.act(
            ConnectionId(700),
            ClientAction::RespondInvitation { accept: true },
        );
        assert!(rejection(&answer).is_none());
        assert!(table.authority.game().is_traitor(target));
        assert!(table.authority.game().state().pending_invitation.is_none());
        assert_eq!(table.phase(), Phase::Night);
    }

    #[test]
    fn stale_connection_no_longer_acts_after_reconnect() {
        let mut table = Table::started(5);
        let player = table.faithful()[0];
        let token = table.authority.game().roster().get(player).unwrap().token.clone();
        let old = table.authority.game().roster().connection_of(player).unwrap();

        table.act(ConnectionId(600), ClientAction::Reconnect { token });
        let outcome = table.act(
            old,
            ClientAction::Chat {
                message: "still here?".to_string(),
                audience: shared::ChatAudience::All,
            },
        );

        assert_eq!(rejection(&outcome), Some(ErrorKind::IllegalAction));
    }

    #[test]
    fn restart_resumes_from_the_store() {
        let mut table = Table::at_night_two(6);
        let victim = table.kill_first_faithful();
        let snapshot = table.authority.game().snapshot();

        let (saved, players) = load_saved_game(table.store.as_ref());
        assert_eq!(saved.as_ref(), Some(&snapshot));
        assert_eq!(players.len(), 6);

        let config = GameConfig::default();
        let restored = Game::restore(
            config.clone(),
            RoleAssigner::seeded(1, config.traitor_count, config.min_players),
            Arc::new(FixedClock::at(23, 30)),
            saved,
            players,
        );
        let mut authority = SessionAuthority::new(restored, SECRET);

        assert_eq!(authority.game().phase(), Phase::Roundtable);
        assert!(!authority.game().roster().is_alive(victim));
        assert!(authority
            .game()
            .roster()
            .iter()
            .all(|p| p.connection.is_none()));

        let traitor = table.traitors()[0];
        let token = table.authority.game().roster().get(traitor).unwrap().token.clone();
        let outcome = authority.handle(ConnectionId(9), ClientAction::Reconnect { token });
        assert!(rejection(&outcome).is_none());
        assert!(authority.game().is_traitor(traitor));
    }

    #[test]
    fn reset_clears_the_store() {
        let mut table = Table::at_night_two(5);
        assert_ok!(table.store.load_snapshot()).unwrap();

        table.act(ADMIN, ClientAction::AdminReset);

        assert_eq!(assert_ok!(table.store.load_snapshot()), None);
        assert!(assert_ok!(table.store.list_players()).is_empty());
        assert_eq!(table.phase(), Phase::Waiting);
    }

    #[test]
    fn unreadable_store_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        assert_err!(server::persistence::JsonFileStore::open(&file));
    }
}

/// REAL UDP ROUND TRIPS
mod network_tests {
    use super::*;
    use server::network::{Server, ServerMessage};
    use shared::{decode_packet, encode_packet, Packet, MAX_PACKET_SIZE};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    #[test]
    fn full_table_broadcasts_fit_in_one_datagram() {
        let mut table = Table::with_players(0);
        let config = GameConfig::default();
        for i in 0..config.max_players as u32 {
            // widest names the rules allow: every character is four bytes
            let name = format!(
                "{}{}",
                char::from_u32(0x1F600 + i).unwrap(),
                "🎭".repeat(config.max_name_len - 1)
            );
            let outcome = table.act(
                ConnectionId(i + 1),
                ClientAction::Join {
                    display_name: name,
                    avatar: "a".repeat(config.max_avatar_len),
                },
            );
            assert!(rejection(&outcome).is_none());
        }

        let late = table.act(
            ConnectionId(500),
            ClientAction::Join {
                display_name: "late".to_string(),
                avatar: String::new(),
            },
        );
        assert_eq!(rejection(&late), Some(ErrorKind::ValidationFailure));
        let oversized = {
            let mut table = Table::with_players(0);
            table.act(
                ConnectionId(1),
                ClientAction::Join {
                    display_name: "Ana".to_string(),
                    avatar: "a".repeat(5000),
                },
            )
        };
        assert_eq!(rejection(&oversized), Some(ErrorKind::ValidationFailure));

        let roster = Packet::Event(ServerEvent::RosterChanged {
            players: table.authority.game().roster().public_view(),
        });
        let admin = Packet::Event(ServerEvent::AdminState(table.authority.admin_view()));
        for packet in [roster, admin] {
            let bytes = assert_ok!(encode_packet(&packet));
            assert!(
                bytes.len() <= MAX_PACKET_SIZE,
                "{} bytes, limit {}",
                bytes.len(),
                MAX_PACKET_SIZE
            );
        }
    }

    async fn spawn_server() -> (std::net::SocketAddr, tokio::sync::mpsc::UnboundedSender<ServerMessage>) {
        let mut server = Server::new(
            "127.0.0.1:0",
            16,
            Duration::from_secs(30),
            SessionAuthority::new(new_game(3), SECRET),
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        (addr, shutdown)
    }

    async fn send(socket: &UdpSocket, addr: std::net::SocketAddr, packet: Packet) {
        let data = encode_packet(&packet).unwrap();
        socket.send_to(&data, addr).await.unwrap();
    }

    /// Reads packets until one matches, failing after two seconds.
    async fn expect<F>(socket: &UdpSocket, mut matches: F) -> Packet
    where
        F: FnMut(&Packet) -> bool,
    {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                .await
                .expect("timed out waiting for the server")
                .unwrap();
            let packet = decode_packet(&buf[..len]).unwrap();
            if matches(&packet) {
                return packet;
            }
        }
    }

    #[tokio::test]
    async fn join_over_udp_returns_token() {
        let (addr, shutdown) = spawn_server().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(
            &client,
            addr,
            Packet::Action(ClientAction::Join {
                display_name: "Ana".to_string(),
                avatar: String::new(),
            }),
        )
        .await;

        let joined = expect(&client, |p| {
            matches!(p, Packet::Event(ServerEvent::Joined { .. }))
        })
        .await;
        let Packet::Event(ServerEvent::Joined { token, .. }) = joined else {
            unreachable!()
        };
        assert_eq!(token.as_str().len(), 32);

        send(&client, addr, Packet::Heartbeat).await;
        expect(&client, |p| *p == Packet::Heartbeat).await;

        shutdown.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn refusals_arrive_as_rejections() {
        let (addr, shutdown) = spawn_server().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        send(&client, addr, Packet::Action(ClientAction::StartGame)).await;

        let rejected = expect(&client, |p| {
            matches!(p, Packet::Event(ServerEvent::Rejected { .. }))
        })
        .await;
        assert!(matches!(
            rejected,
            Packet::Event(ServerEvent::Rejected {
                kind: ErrorKind::IllegalAction,
                ..
            })
        ));

        shutdown.send(ServerMessage::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn roster_changes_reach_other_clients() {
        let (addr, shutdown) = spawn_server().await;
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        for (socket, name) in [(&first, "Ana"), (&second, "Bea")] {
            send(
                socket,
                addr,
                Packet::Action(ClientAction::Join {
                    display_name: name.to_string(),
                    avatar: String::new(),
                }),
            )
            .await;
            expect(socket, |p| matches!(p, Packet::Event(ServerEvent::Joined { .. }))).await;
        }

        expect(&first, |p| {
            matches!(
                p,
                Packet::Event(ServerEvent::RosterChanged { players }) if players.len() == 2
            )
        })
        .await;

        shutdown.send(ServerMessage::Shutdown).unwrap();
    }
}
