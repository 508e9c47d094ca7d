//! Order lifecycle: an order machine triggering an item machine.

use hookflow_core::{CoreError, Engine, TransitionProcessor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Subject {
    Order {
        id: u32,
        authorization: Vec<String>,
        items: Vec<u32>,
    },
    Item {
        id: u32,
    },
}

impl Subject {
    fn key(&self) -> String {
        match self {
            Subject::Order { id, .. } => format!("order:{}", id),
            Subject::Item { id } => format!("item:{}", id),
        }
    }
}

/// In-memory stand-in for the status tables.
#[derive(Default)]
struct Store {
    states: Mutex<HashMap<String, String>>,
    stock: Mutex<HashMap<u32, bool>>,
    events: Mutex<Vec<String>>,
}

impl Store {
    fn set(&self, key: &str, state: &str) {
        self.states
            .lock()
            .insert(key.to_string(), state.to_string());
    }

    fn get(&self, key: &str) -> Option<String> {
        self.states.lock().get(key).cloned()
    }

    fn event(&self, event: String) {
        self.events.lock().push(event);
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn wire_common(engine: &mut Engine<Subject>, store: &Arc<Store>) {
    let read = store.clone();
    let write = store.clone();
    engine
        .set_current_state(move |subject: &Subject| {
            read.get(&subject.key())
                .ok_or_else(|| format!("{} has no status", subject.key()).into())
        })
        .set_execute(move |target, subject: &Subject| {
            write.set(&subject.key(), target);
            write.event(format!("{} -> {}", subject.key(), target));
            Ok(())
        });
}

fn item_engine(store: &Arc<Store>) -> Engine<Subject> {
    let mut engine = Engine::new();
    engine.load(fixture("order-item.yaml")).unwrap();
    wire_common(&mut engine, store);

    let stock = store.clone();
    let backorders = store.clone();
    engine
        .add_check("in_stock", move |subject: &Subject, _: &[String]| {
            let Subject::Item { id } = subject else {
                return Err("in_stock expects an item".into());
            };
            match stock.stock.lock().get(id) {
                Some(true) => Ok(true),
                Some(false) => Ok(false),
                None => Err(format!("item {} is unknown to inventory", id).into()),
            }
        })
        .add_on_error("backorder", move |subject: &Subject, _: &[String]| {
            backorders.event(format!("backorder {}", subject.key()));
            Ok(true)
        });
    engine
}

fn order_engine(store: &Arc<Store>) -> Engine<Subject> {
    let mut engine = Engine::new();
    engine.load(fixture("order.json")).unwrap();
    wire_common(&mut engine, store);

    let failures = store.clone();
    let shipped = store.clone();
    let notifications = store.clone();
    engine
        .add_check("auth", |subject: &Subject, args: &[String]| match subject {
            Subject::Order { authorization, .. } => {
                Ok(args.iter().all(|a| authorization.contains(a)))
            }
            Subject::Item { .. } => Ok(false),
        })
        .add_adapter("order_items", |subject: &Subject| match subject {
            Subject::Order { items, .. } => {
                Ok(items.iter().map(|id| Subject::Item { id: *id }).collect())
            }
            Subject::Item { .. } => Err("order_items expects an order".into()),
        })
        .add_filter("unshipped", move |items: Vec<Subject>| {
            Ok(items
                .into_iter()
                .filter(|item| {
                    shipped.get(&item.key()).as_deref() != Some("ready-for-shipment")
                })
                .collect())
        })
        .add_on_success("notify", move |subject: &Subject, args: &[String]| {
            notifications.event(format!("notify {} via {}", subject.key(), args.join(",")));
            Ok(true)
        })
        .add_on_error("log_failure", move |subject: &Subject, _: &[String]| {
            failures.event(format!("failure {}", subject.key()));
            Ok(true)
        });
    engine
}

fn setup() -> (Arc<Store>, Engine<Subject>) {
    let store = Arc::new(Store::default());
    let items = Arc::new(item_engine(&store));
    let mut orders = order_engine(&store);
    orders.add_engine_to_trigger(items);
    (store, orders)
}

fn order(items: Vec<u32>, authorization: &[&str]) -> Subject {
    Subject::Order {
        id: 1,
        authorization: authorization.iter().map(|a| a.to_string()).collect(),
        items,
    }
}

#[test]
fn test_wiring_is_complete() {
    let (_store, orders) = setup();
    assert!(orders.unresolved_handlers().is_empty());
    assert_eq!(orders.name(), "order");
    assert_eq!(orders.transitions_from("created"), vec!["being-processed", "cancelled"]);
}

#[test]
fn test_pickup_without_items() {
    let store = Arc::new(Store::default());
    let mut engine = Engine::new();
    engine.load(fixture("pickup.json")).unwrap();
    wire_common(&mut engine, &store);
    engine.add_check("auth", |subject: &Subject, args: &[String]| match subject {
        Subject::Order { authorization, .. } => {
            Ok(args.iter().any(|a| authorization.contains(a)))
        }
        Subject::Item { .. } => Ok(false),
    });

    store.set("order:1", "being-processed");
    assert!(engine
        .process_transition("ready-for-pickup", &order(vec![], &["AUTH_1"]))
        .unwrap());
    assert_eq!(store.get("order:1").as_deref(), Some("ready-for-pickup"));

    store.set("order:1", "being-processed");
    assert!(!engine
        .process_transition("ready-for-pickup", &order(vec![], &["AUTH_2"]))
        .unwrap());
    assert_eq!(store.get("order:1").as_deref(), Some("being-processed"));
}

#[test]
fn test_order_triggers_items() {
    let (store, orders) = setup();
    store.set("order:1", "being-processed");
    for id in [7, 8] {
        store.set(&format!("item:{}", id), "ready-for-pickup");
        store.stock.lock().insert(id, true);
    }

    let subject = order(vec![7, 8], &["AUTH_1"]);
    assert!(orders.process_transition("ready-for-pickup", &subject).unwrap());

    assert_eq!(store.get("order:1").as_deref(), Some("ready-for-pickup"));
    assert_eq!(store.get("item:7").as_deref(), Some("ready-for-shipment"));
    assert_eq!(store.get("item:8").as_deref(), Some("ready-for-shipment"));
    assert_eq!(
        *store.events.lock(),
        vec![
            "order:1 -> ready-for-pickup",
            "item:7 -> ready-for-shipment",
            "item:8 -> ready-for-shipment",
            "notify order:1 via email",
        ]
    );
}

#[test]
fn test_filter_skips_shipped_items() {
    let (store, orders) = setup();
    store.set("order:1", "being-processed");
    store.set("item:7", "ready-for-shipment");
    store.set("item:8", "ready-for-pickup");
    store.stock.lock().insert(8, true);

    assert!(orders
        .process_transition("ready-for-pickup", &order(vec![7, 8], &["AUTH_1"]))
        .unwrap());
    assert_eq!(
        *store.events.lock(),
        vec![
            "order:1 -> ready-for-pickup",
            "item:8 -> ready-for-shipment",
            "notify order:1 via email",
        ]
    );
}

#[test]
fn test_item_out_of_stock_stops_order_chain() {
    let (store, orders) = setup();
    store.set("order:1", "being-processed");
    store.set("item:7", "ready-for-pickup");
    store.set("item:8", "ready-for-pickup");
    store.stock.lock().insert(7, false);
    store.stock.lock().insert(8, true);

    let result = orders.process_transition("ready-for-pickup", &order(vec![7, 8], &["AUTH_1"]));
    assert!(!result.unwrap());

    // The order itself already moved; the chain stopped at the first item
    assert_eq!(store.get("order:1").as_deref(), Some("ready-for-pickup"));
    assert_eq!(store.get("item:8").as_deref(), Some("ready-for-pickup"));
    assert_eq!(*store.events.lock(), vec!["order:1 -> ready-for-pickup"]);
}

#[test]
fn test_item_inventory_error_recovered_by_item_machine() {
    let (store, orders) = setup();
    store.set("order:1", "being-processed");
    store.set("item:9", "ready-for-pickup");

    assert!(orders
        .process_transition("ready-for-pickup", &order(vec![9], &["AUTH_1"]))
        .unwrap());
    assert_eq!(
        *store.events.lock(),
        vec![
            "order:1 -> ready-for-pickup",
            "backorder item:9",
            "notify order:1 via email",
        ]
    );
}

#[test]
fn test_item_without_status_fails_order() {
    let (store, orders) = setup();
    store.set("order:1", "being-processed");

    let err = orders
        .process_transition("ready-for-pickup", &order(vec![5], &["AUTH_1"]))
        .unwrap_err();
    assert!(matches!(err, CoreError::CurrentState(_)));

    // Success chain failures do not run the order's on-error chain
    assert!(!store
        .events
        .lock()
        .iter()
        .any(|e| e.starts_with("failure")));
}

#[test]
fn test_unknown_transition() {
    let (store, orders) = setup();
    store.set("order:1", "created");

    let err = orders
        .process_transition("ready-for-pickup", &order(vec![], &["AUTH_1"]))
        .unwrap_err();
    assert_eq!(err.error_code(), "TRANSITION_NOT_FOUND");
    assert!(store.events.lock().is_empty());
}
