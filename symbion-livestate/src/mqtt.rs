use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::lifecycle::update_item;
use crate::models::{ChangeSet, ItemId, ItemKind};
use crate::scope::AccessScope;
use crate::store::LiveStore;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{debug, info, warn};

pub const CHECK_TOPIC: &str = "symbion/livestate/check@v1";

/// Résultat de check publié par un poller
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckResultIn {
    pub kind: ItemKind,
    pub id: ItemId,
    #[serde(flatten)]
    pub change: ChangeSet,
}

pub fn parse_check_result(payload: &[u8]) -> Result<CheckResultIn, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Applique un résultat de check. Les pollers ont une portée admin.
pub fn apply_check_result(store: &dyn LiveStore, check: CheckResultIn) {
    match update_item(store, check.kind, &check.id, check.change, &AccessScope::admin()) {
        Ok(item) => debug!(kind = %check.kind, item = %item.id, overall = item.overall_state_id, "check result applied"),
        Err(e) => warn!(kind = %check.kind, item = %check.id, error = %e, "check result rejected"),
    }
}

pub fn spawn_mqtt_listener(store: Arc<dyn LiveStore>, conf: MqttConf, health: HealthTracker) {
    task::spawn(async move {
        let mut opts = MqttOptions::new("symbion-livestate", &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        health.mark_mqtt_connecting();

        // rumqttc rejoue la souscription à chaque reconnexion via ConnAck
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!(host = %conf.host, port = conf.port, "mqtt connected");
                    health.mark_mqtt_connected();
                    if let Err(e) = client.subscribe(CHECK_TOPIC, QoS::AtLeastOnce).await {
                        warn!(error = ?e, "mqtt subscribe failed");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == CHECK_TOPIC => {
                    match parse_check_result(&p.payload) {
                        Ok(check) => apply_check_result(store.as_ref(), check),
                        Err(e) => warn!(error = %e, "invalid check result payload dropped"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = ?e, "mqtt connection error");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::create_item;
    use crate::models::{LsState, NewItem, StateType};
    use crate::store::MemoryStore;

    #[test]
    fn test_parse_check_result() {
        let check = parse_check_result(
            br#"{"kind":"host","id":"h1","ls_state":"DOWN","ls_state_type":"HARD","ls_output":"PING CRITICAL"}"#,
        )
        .unwrap();
        assert_eq!(check.kind, ItemKind::Host);
        assert_eq!(check.id, "h1");
        assert_eq!(check.change.ls_state, Some(LsState::Down));
        assert_eq!(check.change.ls_output.as_deref(), Some("PING CRITICAL"));
        assert!(check.change.ls_acknowledged.is_none());

        assert!(parse_check_result(br#"{"kind":"router","id":"x"}"#).is_err());
        assert!(parse_check_result(b"not json").is_err());
    }

    #[test]
    fn test_apply_check_result_updates_counters() {
        let store = MemoryStore::new();
        let root = store.insert_realm("All", None).unwrap().id;
        let new = NewItem { name: "web".into(), ls_state: Some(LsState::Up), ..NewItem::default() };
        let host = create_item(&store, ItemKind::Host, new, &AccessScope::admin()).unwrap();

        apply_check_result(
            &store,
            CheckResultIn {
                kind: ItemKind::Host,
                id: host.id.clone(),
                change: ChangeSet::state(LsState::Down, StateType::Hard),
            },
        );
        let row = store.find_livesynthesis(&root).unwrap().unwrap().counters;
        assert_eq!(row.hosts_up_hard, 0);
        assert_eq!(row.hosts_down_hard, 1);

        // item inconnu : loggé, rien ne bouge
        apply_check_result(
            &store,
            CheckResultIn { kind: ItemKind::Host, id: "ghost".into(), change: ChangeSet::acknowledged(true) },
        );
        assert_eq!(store.find_livesynthesis(&root).unwrap().unwrap().counters.hosts_acknowledged, 0);
    }
}
