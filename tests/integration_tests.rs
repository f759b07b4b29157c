//! Integration tests for the run engine and its UDP front end
//!
//! The engine tests drive `Game` with recording collaborators and a logical
//! clock. The network tests run a real server on a loopback socket.

use assert_approx_eq::assert_approx_eq;
use bincode::{deserialize, serialize};
use client::network::Client;
use server::config::GameConfig;
use server::game::Game;
use server::model::RunVariant;
use server::network::{Server, ServerMessage, ServerOptions};
use server::testing::RecordingHost;
use shared::triangulation::{triangulate, ThrowEvent};
use shared::{GameMode, Packet, PlayerId, Vec3};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn game_with(players: &[(PlayerId, &str)]) -> Game<RecordingHost> {
    let mut game = Game::new(GameConfig::default(), RecordingHost::with_players(players));
    game.seed_rng(42);
    game
}

fn provide_worlds(game: &mut Game<RecordingHost>) {
    let call = game
        .host()
        .last_provision()
        .cloned()
        .expect("no worlds were requested");
    game.on_worlds_ready(RecordingHost::worlds_for(&call, 99));
}

/// RUN ENGINE TESTS
mod engine_tests {
    use super::*;
    use proptest::prelude::*;

    const PLAYERS: [(PlayerId, &str); 6] = [
        (1, "ann"),
        (2, "bob"),
        (3, "cid"),
        (4, "dee"),
        (5, "eve"),
        (6, "fay"),
    ];

    fn assert_registry_consistent(game: &Game<RecordingHost>) {
        for (player, _) in PLAYERS {
            if let Some(run) = game.registry().get_active_run(player) {
                assert!(run.contains(player), "run {} lost player {}", run.id, player);
            }
        }

        let mut seen = Vec::new();
        for id in game.registry().run_ids() {
            let run = game.registry().run(id).unwrap();
            for player in run.participants() {
                assert!(!seen.contains(&player), "player {} is in two runs", player);
                assert_eq!(game.registry().run_id_of(player), Some(id));
                seen.push(player);
            }
        }
    }

    #[test]
    fn request_to_player_in_run_creates_no_entry() {
        let mut game = game_with(&PLAYERS);
        game.start(GameMode::Solo, 2).unwrap();

        assert!(game.request(GameMode::Battle, 1, 2).is_err());
        assert!(game.request(GameMode::Coop, 1, 2).is_err());
        assert!(game.battle().requests().is_empty());
        assert!(game.coop().invites().is_empty());
    }

    #[test]
    fn accepted_request_ignores_late_decline_and_timeout() {
        let mut game = game_with(&PLAYERS);
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();
        let run_id = game.registry().run_id_of(1).unwrap();

        assert!(game.decline(GameMode::Battle, 2).is_err());
        game.advance(game.config().request_timeout * 2);

        assert_eq!(game.registry().run_id_of(1), Some(run_id));
        assert_eq!(game.registry().run_id_of(2), Some(run_id));
        assert!(!game.host().received(1, "expired"));
    }

    #[test]
    fn decline_frees_the_slot_for_a_new_request() {
        let mut game = game_with(&PLAYERS);
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.decline(GameMode::Battle, 2).unwrap();

        game.request(GameMode::Battle, 1, 2).unwrap();
        assert_eq!(game.battle().requests().get(2).unwrap().initiator, 1);
    }

    #[test]
    fn team_invite_falls_back_when_target_has_no_teammate() {
        let mut game = game_with(&PLAYERS);
        game.select_teammate(1, Some(3)).unwrap();

        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();

        let run = game.registry().get_active_run(1).unwrap();
        assert_eq!(run.variant, RunVariant::Duel);
        assert_eq!(run.participants().len(), 2);
        assert!(!game.is_in_run(3));
    }

    #[test]
    fn disconnect_in_team_run_awards_forfeit_to_other_side() {
        let mut game = game_with(&PLAYERS);
        game.select_teammate(1, Some(2)).unwrap();
        game.select_teammate(3, Some(4)).unwrap();
        game.request(GameMode::Battle, 1, 3).unwrap();
        game.accept(GameMode::Battle, 3).unwrap();
        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));

        game.handle_quit(2);
        game.host_mut().disconnect(2);

        for player in 1..=4 {
            assert!(!game.registry().is_in_any_run(player));
        }
        assert!(game.host().received(3, "You won!"));
        assert!(game.host().received(4, "You won!"));
        assert!(!game.host().received(1, "You won!"));
        assert_registry_consistent(&game);
    }

    #[test]
    fn finished_run_stays_registered_until_teardown() {
        let mut game = game_with(&PLAYERS);
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();
        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));
        game.advance(Duration::from_secs(90));

        game.complete_run(2).unwrap();
        let delay = game.config().finish_delay();
        game.advance(delay - Duration::from_millis(1));
        assert!(game.registry().is_in_any_run(1));
        assert!(game.registry().is_in_any_run(2));

        game.advance(Duration::from_millis(1));
        assert!(!game.registry().is_in_any_run(1));
        assert!(!game.registry().is_in_any_run(2));
        assert_eq!(game.leaderboard().entries()[0].player, "bob");
        assert_eq!(game.leaderboard().entries()[0].millis, 90_000);
    }

    #[test]
    fn participants_share_one_stopwatch() {
        let mut game = game_with(&PLAYERS);
        game.request(GameMode::Coop, 1, 2).unwrap();
        game.accept(GameMode::Coop, 2).unwrap();
        game.start(GameMode::Coop, 1).unwrap();

        let run = game.registry().get_active_run(1).unwrap();
        let runners = run.runners();
        assert_eq!(runners.len(), 2);
        assert!(runners[0].stopwatch.shares_counter_with(&runners[1].stopwatch));
        assert!(!run.stopwatch.is_running());

        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));
        assert!(game.registry().get_active_run(2).unwrap().stopwatch.is_running());
    }

    #[test]
    fn throws_in_a_running_run_are_triangulated() {
        let mut game = game_with(&PLAYERS);
        game.start(GameMode::Solo, 1).unwrap();
        provide_worlds(&mut game);

        let first = ThrowEvent::new(Vec3::new(0.0, 70.0, 0.0), Vec3::new(10.0, 71.0, 10.0), 1);
        let second = ThrowEvent::new(Vec3::new(0.0, 70.0, 10.0), Vec3::new(10.0, 71.0, 0.0), 2);

        // Frozen during the countdown.
        assert!(game.handle_throw(1, first).is_none());

        game.advance(Duration::from_secs(5));
        assert!(game.handle_throw(1, first).is_none());
        let result = game.handle_throw(1, second).expect("no triangulation");
        assert_approx_eq!(result.surface.x, 5.0, 1e-9);
        assert_approx_eq!(result.surface.z, 5.0, 1e-9);
    }

    #[test]
    fn triangulation_is_deterministic() {
        // North is -z; the second ray crosses the first at (0, -5).
        let throws = [
            ThrowEvent::new(Vec3::new(0.0, 64.0, 0.0), Vec3::new(0.0, 64.0, -10.0), 0),
            ThrowEvent::new(Vec3::new(10.0, 64.0, -5.0), Vec3::new(0.0, 64.0, -5.0), 0),
        ];

        let first = triangulate(&throws).unwrap();
        for _ in 0..100 {
            assert_eq!(triangulate(&throws), Some(first));
        }
        assert_approx_eq!(first.surface.x, 0.0, 1e-9);
        assert_approx_eq!(first.surface.z, -5.0, 1e-9);
    }

    #[derive(Debug, Clone)]
    enum Op {
        SoloStart(PlayerId),
        Stop(PlayerId),
        Request(GameMode, PlayerId, PlayerId),
        Accept(GameMode, PlayerId),
        Decline(GameMode, PlayerId),
        Team(PlayerId, PlayerId),
        Worlds,
        Complete(PlayerId),
        Quit(PlayerId),
        Wait(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        let player = 1u32..=6;
        let mode = prop_oneof![Just(GameMode::Battle), Just(GameMode::Coop)];
        prop_oneof![
            player.clone().prop_map(Op::SoloStart),
            player.clone().prop_map(Op::Stop),
            (mode.clone(), player.clone(), player.clone()).prop_map(|(m, a, b)| Op::Request(m, a, b)),
            (mode.clone(), player.clone()).prop_map(|(m, p)| Op::Accept(m, p)),
            (mode, player.clone()).prop_map(|(m, p)| Op::Decline(m, p)),
            (player.clone(), player.clone()).prop_map(|(a, b)| Op::Team(a, b)),
            Just(Op::Worlds),
            player.clone().prop_map(Op::Complete),
            player.prop_map(Op::Quit),
            (0u64..40).prop_map(Op::Wait),
        ]
    }

    proptest! {
        #[test]
        fn every_player_is_in_at_most_one_run(ops in proptest::collection::vec(op(), 1..60)) {
            let mut game = game_with(&PLAYERS);

            for op in ops {
                match op {
                    Op::SoloStart(p) => { let _ = game.start(GameMode::Solo, p); }
                    Op::Stop(p) => { let _ = game.stop(p); }
                    Op::Request(m, a, b) => { let _ = game.request(m, a, b); }
                    Op::Accept(m, p) => { let _ = game.accept(m, p); }
                    Op::Decline(m, p) => { let _ = game.decline(m, p); }
                    Op::Team(a, b) => { let _ = game.select_teammate(a, Some(b)); }
                    Op::Worlds => {
                        if let Some(call) = game.host().last_provision().cloned() {
                            game.on_worlds_ready(RecordingHost::worlds_for(&call, 5));
                        }
                    }
                    Op::Complete(p) => { let _ = game.complete_run(p); }
                    Op::Quit(p) => game.handle_quit(p),
                    Op::Wait(secs) => game.advance(Duration::from_secs(secs)),
                }
                assert_registry_consistent(&game);
            }
        }
    }
}

/// NETWORK TESTS
mod network_tests {
    use super::*;

    async fn wait_for(client: &mut Client, wanted: impl Fn(&Packet) -> bool) -> Packet {
        loop {
            let packet = client.recv_packet().await.expect("receive failed");
            if wanted(&packet) {
                return packet;
            }
        }
    }

    fn is_title(packet: &Packet, expected: &str) -> bool {
        matches!(packet, Packet::Title { title, .. } if title == expected)
    }

    fn quick_options() -> ServerOptions {
        ServerOptions {
            config: GameConfig {
                countdown_seconds: 1,
                ..GameConfig::default()
            },
            provisioning_delay: Duration::from_millis(20),
            ..ServerOptions::default()
        }
    }

    /// Tests a full solo run over UDP: connect, start, countdown, finish
    #[tokio::test]
    async fn solo_run_over_udp() {
        let mut server = Server::new("127.0.0.1:0", quick_options()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();

        let player = async move {
            let mut client = Client::new(&addr.to_string(), "ann").await.unwrap();
            client.connect().await.unwrap();
            wait_for(&mut client, |p| matches!(p, Packet::Connected { .. })).await;
            assert!(client.is_connected());
            assert!(client.player_id().is_some());

            client
                .send_packet(&Packet::Command {
                    line: "solo start".to_string(),
                })
                .await
                .unwrap();
            wait_for(&mut client, |p| matches!(p, Packet::Frozen { frozen: true })).await;
            wait_for(&mut client, |p| is_title(p, "Go!")).await;

            client.send_packet(&Packet::ExitPortal).await.unwrap();
            let won = wait_for(&mut client, |p| is_title(p, "You won!")).await;
            if let Packet::Title { subtitle, .. } = won {
                assert!(subtitle.contains(':'));
            }

            handle.send(ServerMessage::Shutdown).unwrap();
        };

        let (result, ()) = timeout(Duration::from_secs(15), async {
            tokio::join!(server.run(), player)
        })
        .await
        .expect("solo run did not finish in time");
        result.unwrap();
    }

    /// Tests that mismatched protocol versions are turned away
    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let mut server = Server::new("127.0.0.1:0", ServerOptions::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();

        let probe = async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let connect = Packet::Connect {
                client_version: 999,
                name: "ann".to_string(),
            };
            socket.send_to(&serialize(&connect).unwrap(), addr).await.unwrap();

            let mut buf = [0u8; 1024];
            let (len, _) = socket.recv_from(&mut buf).await.unwrap();
            match deserialize::<Packet>(&buf[..len]).unwrap() {
                Packet::Disconnected { reason } => assert!(reason.contains("version")),
                other => panic!("Expected Disconnected, got {:?}", other),
            }

            handle.send(ServerMessage::Shutdown).unwrap();
        };

        let (result, ()) = timeout(Duration::from_secs(5), async {
            tokio::join!(server.run(), probe)
        })
        .await
        .expect("server did not answer in time");
        result.unwrap();
    }

    /// Tests that a second player cannot take a name already in use
    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let mut server = Server::new("127.0.0.1:0", ServerOptions::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();

        let players = async move {
            let mut first = Client::new(&addr.to_string(), "ann").await.unwrap();
            first.connect().await.unwrap();
            wait_for(&mut first, |p| matches!(p, Packet::Connected { .. })).await;

            let mut second = Client::new(&addr.to_string(), "ANN").await.unwrap();
            second.connect().await.unwrap();
            match wait_for(&mut second, |p| {
                matches!(p, Packet::Connected { .. } | Packet::Disconnected { .. })
            })
            .await
            {
                Packet::Disconnected { reason } => assert!(reason.contains("already taken")),
                other => panic!("Expected Disconnected, got {:?}", other),
            }
            assert!(!second.is_connected());

            handle.send(ServerMessage::Shutdown).unwrap();
        };

        let (result, ()) = timeout(Duration::from_secs(5), async {
            tokio::join!(server.run(), players)
        })
        .await
        .expect("server did not answer in time");
        result.unwrap();
    }
}
