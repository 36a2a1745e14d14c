//! Poll pipeline tests against mocked provider endpoints.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gridwatch::config::ProvidersConfig;
use gridwatch::db::store::Store;
use gridwatch::game::odds::OddsSource;
use gridwatch::game::phase::GamePhase;
use gridwatch::pipeline::builder::SnapshotBuilder;
use gridwatch::providers::espn::EspnClient;
use gridwatch::providers::odds_api::OddsApiClient;

fn providers_config(espn_url: &str, odds_url: &str) -> ProvidersConfig {
    ProvidersConfig {
        espn_base_url: espn_url.to_string(),
        odds_api_base_url: odds_url.to_string(),
        sport_key: "americanfootball_nfl".to_string(),
        regions: "us".to_string(),
        full_game_markets: "h2h,spreads,totals".to_string(),
        second_half_markets: "h2h_h2,spreads_h2,totals_h2".to_string(),
        odds_requests_per_minute: 600,
        second_half_freshness_seconds: 60,
    }
}

fn competitor(name: &str, abbr: &str, side: &str, score: &str) -> serde_json::Value {
    json!({
        "team": {"displayName": name, "abbreviation": abbr},
        "score": score,
        "homeAway": side,
        "records": [{"type": "total", "summary": "5-3"}],
        "statistics": [{"name": "totalYards", "displayValue": "198"}]
    })
}

fn live_event(id: &str, status: &str, period: i64, clock: &str) -> serde_json::Value {
    json!({
        "id": id,
        "date": "2025-11-02T18:00Z",
        "competitions": [{
            "competitors": [
                competitor("Buffalo Bills", "BUF", "home", "17"),
                competitor("Miami Dolphins", "MIA", "away", "10")
            ],
            "status": {
                "type": {"state": "in", "description": status},
                "period": period,
                "displayClock": clock
            },
            "venue": {"fullName": "Highmark Stadium"},
            "broadcasts": [{"names": ["CBS"]}],
            "odds": [{
                "details": "BUF -3.0",
                "overUnder": 47.5,
                "spread": -3.0,
                "homeTeamOdds": {"moneyLine": -160},
                "awayTeamOdds": {"moneyLine": 140}
            }]
        }]
    })
}

fn summary_body() -> serde_json::Value {
    json!({
        "boxscore": {"teams": [
            {"homeAway": "home", "statistics": [{"name": "totalYards", "displayValue": "312"}]},
            {"homeAway": "away", "statistics": [{"name": "totalYards", "displayValue": "287"}]}
        ]},
        "drives": {"previous": [{
            "id": "d1",
            "team": {"abbreviation": "MIA"},
            "description": "6 plays, 42 yards",
            "plays": [{
                "id": "p1",
                "type": {"text": "Pass"},
                "text": "Deep pass complete for 28 yards",
                "awayScore": 7,
                "homeScore": 0,
                "period": {"number": 1},
                "clock": {"displayValue": "9:12"},
                "scoringPlay": true,
                "statYardage": 28
            }]
        }]}
    })
}

async fn mount_fpi_unavailable(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/fpi"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn summary_failure_for_one_game_does_not_block_others() {
    let espn = MockServer::start().await;
    mount_fpi_unavailable(&espn).await;

    Mock::given(method("GET"))
        .and(path("/scoreboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                live_event("game1", "In Progress", 3, "10:21"),
                live_event("game2", "In Progress", 1, "5:00")
            ]
        })))
        .mount(&espn)
        .await;

    Mock::given(method("GET"))
        .and(path("/summary"))
        .and(query_param("event", "game1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
        .mount(&espn)
        .await;

    // The second game's summary endpoint is broken.
    Mock::given(method("GET"))
        .and(path("/summary"))
        .and(query_param("event", "game2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&espn)
        .await;

    let store = Store::new(":memory:").await.unwrap();
    let espn_client = EspnClient::new(&espn.uri());
    let config = providers_config(&espn.uri(), &espn.uri());
    let builder = SnapshotBuilder::new(&espn_client, None, &store, &config);

    let outcome = builder.run_poll().await.unwrap();
    assert_eq!(outcome.games, 2);
    assert_eq!(outcome.inserted, 2);

    // Detailed stats for the healthy game.
    let snap1 = store
        .latest_snapshot("game1")
        .await
        .unwrap()
        .unwrap()
        .to_snapshot()
        .unwrap();
    assert_eq!(snap1.home_stats.get("totalYards").unwrap(), "312");
    assert_eq!(snap1.play_by_play.len(), 1);
    assert_eq!(snap1.phase, GamePhase::Live);

    // Scoreboard fallback stats for the broken one.
    let snap2 = store
        .latest_snapshot("game2")
        .await
        .unwrap()
        .unwrap()
        .to_snapshot()
        .unwrap();
    assert_eq!(snap2.home_stats.get("totalYards").unwrap(), "198");
    assert!(snap2.play_by_play.is_empty());

    // Primary-only odds from the scoreboard's inline object.
    let odds = snap1.odds.unwrap();
    assert_eq!(odds.source, OddsSource::Espn);
    assert_eq!(odds.espn_fallback.unwrap().spread, Some(-3.0));
}

#[tokio::test]
async fn scoreboard_failure_aborts_the_poll() {
    let espn = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scoreboard"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&espn)
        .await;

    let store = Store::new(":memory:").await.unwrap();
    let espn_client = EspnClient::new(&espn.uri());
    let config = providers_config(&espn.uri(), &espn.uri());
    let builder = SnapshotBuilder::new(&espn_client, None, &store, &config);

    assert!(builder.run_poll().await.is_err());
    assert_eq!(store.count_snapshots().await.unwrap(), 0);
}

#[tokio::test]
async fn halftime_game_gets_secondary_and_second_half_odds() {
    let espn = MockServer::start().await;
    let odds = MockServer::start().await;
    mount_fpi_unavailable(&espn).await;

    Mock::given(method("GET"))
        .and(path("/scoreboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [live_event("game1", "Halftime", 2, "0:00")]
        })))
        .mount(&espn)
        .await;

    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
        .mount(&espn)
        .await;

    Mock::given(method("GET"))
        .and(path("/sports/americanfootball_nfl/odds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "oddsapi-ev-1",
            "home_team": "Buffalo Bills",
            "away_team": "Miami Dolphins",
            "bookmakers": [{
                "key": "draftkings",
                "title": "DraftKings",
                "markets": [
                    {"key": "h2h", "outcomes": [
                        {"name": "Buffalo Bills", "price": -150.0},
                        {"name": "Miami Dolphins", "price": 130.0}
                    ]}
                ]
            }]
        }])))
        .mount(&odds)
        .await;

    Mock::given(method("GET"))
        .and(path("/sports/americanfootball_nfl/events/oddsapi-ev-1/odds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "oddsapi-ev-1",
            "home_team": "Buffalo Bills",
            "away_team": "Miami Dolphins",
            "bookmakers": [{
                "key": "draftkings",
                "title": "DraftKings",
                "markets": [
                    {"key": "spreads_h2", "outcomes": [
                        {"name": "Buffalo Bills", "price": -110.0, "point": -1.5}
                    ]}
                ]
            }]
        })))
        .mount(&odds)
        .await;

    let store = Store::new(":memory:").await.unwrap();
    let espn_client = EspnClient::new(&espn.uri());
    let config = providers_config(&espn.uri(), &odds.uri());
    let odds_client = OddsApiClient::new(&config, "test-key".to_string());
    let builder = SnapshotBuilder::new(&espn_client, Some(&odds_client), &store, &config);

    let outcome = builder.run_poll().await.unwrap();
    assert_eq!(outcome.inserted, 1);

    let snap = store
        .latest_snapshot("game1")
        .await
        .unwrap()
        .unwrap()
        .to_snapshot()
        .unwrap();
    assert_eq!(snap.phase, GamePhase::Halftime);

    let bundle = snap.odds.unwrap();
    assert_eq!(bundle.source, OddsSource::TheOddsApi);
    assert_eq!(
        bundle.consensus.as_ref().unwrap().home_moneyline,
        Some(-150.0)
    );
    // Primary inline odds retained under the fallback field.
    assert_eq!(bundle.espn_fallback.unwrap().spread, Some(-3.0));

    let half = bundle.second_half.unwrap();
    assert_eq!(half.consensus.spread, Some(-1.5));
}

#[tokio::test]
async fn secondary_fetch_is_skipped_when_fresh_data_exists() {
    let espn = MockServer::start().await;
    let odds = MockServer::start().await;
    mount_fpi_unavailable(&espn).await;

    Mock::given(method("GET"))
        .and(path("/scoreboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [live_event("game1", "Halftime", 2, "0:00")]
        })))
        .mount(&espn)
        .await;

    Mock::given(method("GET"))
        .and(path("/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
        .mount(&espn)
        .await;

    // The quota-limited provider must not be called at all this poll.
    Mock::given(method("GET"))
        .and(path("/sports/americanfootball_nfl/odds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&odds)
        .await;

    let store = Store::new(":memory:").await.unwrap();
    let espn_client = EspnClient::new(&espn.uri());
    let config = providers_config(&espn.uri(), &odds.uri());
    let odds_client = OddsApiClient::new(&config, "test-key".to_string());

    // Seed a fresh halftime snapshot that already has secondary odds.
    {
        use chrono::Utc;
        use gridwatch::game::odds::{BookmakerQuote, MarketConsensus, OddsBundle};
        use std::collections::BTreeMap;

        let snap = gridwatch::game::models::GameSnapshot {
            game_id: "game1".to_string(),
            game_date: chrono::NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            start_time: None,
            home_team: "Buffalo Bills".to_string(),
            away_team: "Miami Dolphins".to_string(),
            home_abbr: "BUF".to_string(),
            away_abbr: "MIA".to_string(),
            home_score: 17,
            away_score: 10,
            quarter: 2,
            clock: Some("0:00".to_string()),
            phase: GamePhase::Halftime,
            status_detail: None,
            venue: None,
            broadcast: None,
            home_stats: BTreeMap::new(),
            away_stats: BTreeMap::new(),
            odds: Some(OddsBundle {
                source: OddsSource::TheOddsApi,
                last_update: Utc::now(),
                consensus: Some(MarketConsensus::default()),
                bookmakers: vec![BookmakerQuote {
                    name: "DraftKings".to_string(),
                    ..Default::default()
                }],
                second_half: None,
                espn_fallback: None,
            }),
            play_by_play: Vec::new(),
            home_power: None,
            away_power: None,
            home_standing: None,
            away_standing: None,
            created_at: Utc::now(),
        };
        store.insert_snapshot(&snap).await.unwrap();
    }

    let builder = SnapshotBuilder::new(&espn_client, Some(&odds_client), &store, &config);
    let outcome = builder.run_poll().await.unwrap();
    assert_eq!(outcome.inserted, 1);

    // The new snapshot degrades to primary-only odds; the mock's expect(0)
    // verifies the quota was conserved.
    let snap = store
        .latest_snapshot("game1")
        .await
        .unwrap()
        .unwrap()
        .to_snapshot()
        .unwrap();
    assert_eq!(snap.odds.unwrap().source, OddsSource::Espn);
}
