use std::sync::Arc;
use std::time::Duration;

use regionwatch::{
    Activation, EngineConfig, InMemoryPredicateStore, InMemoryRegionStore, Location, MaskPolicy,
    NotificationSound, PositionPredicate, PresentationOptions, Presentation, Reconciler, Region,
};

const WAIT: Duration = Duration::from_secs(2);

fn chatillon() -> Region {
    Region::circle(Location::new(48.809_995, 2.300_354).unwrap(), 50.0).unwrap()
}

fn start_x() -> PositionPredicate {
    PositionPredicate::inside(
        chatillon(),
        Activation::Always(
            Presentation::new("Start X", "You arrived", NotificationSound::Default).unwrap(),
        ),
    )
}

fn setup(
    policy: MaskPolicy,
) -> (Reconciler, Arc<InMemoryRegionStore>, Arc<InMemoryPredicateStore>) {
    let regions = Arc::new(InMemoryRegionStore::new());
    let predicates = Arc::new(InMemoryPredicateStore::new());
    let config = EngineConfig {
        mask_policy: policy,
        ..EngineConfig::default()
    };
    let engine = Reconciler::with_config(regions.clone(), predicates.clone(), config).unwrap();
    (engine, regions, predicates)
}

#[test]
fn masked_delivery_presents_nothing_and_unmask_restores() {
    let (engine, _, predicates) = setup(MaskPolicy::Disabled);
    let predicate = start_x();
    let id = predicate.id().to_string();
    let _stream = engine.monitor([predicate.clone()]).unwrap();

    assert_eq!(predicates.deliver(&id), Some(PresentationOptions::full()));

    let guard = engine.handled(&predicate);
    assert!(predicates.deliver(&id).unwrap().is_empty());
    assert!(predicates.deliver(&id).unwrap().is_empty());

    drop(guard);
    assert_eq!(predicates.deliver(&id), Some(PresentationOptions::full()));
}

#[test]
fn masking_withdraws_an_already_delivered_notification() {
    let (engine, _, predicates) = setup(MaskPolicy::Disabled);
    let predicate = start_x();
    let id = predicate.id().to_string();
    let _stream = engine.monitor([predicate.clone()]).unwrap();

    predicates.deliver(&id);
    assert!(predicates.delivered_identifiers().contains(&id));

    let _guard = engine.handled(&predicate);
    assert!(!predicates.delivered_identifiers().contains(&id));
}

#[test]
fn live_emission_masks_until_handled() {
    let (engine, regions, predicates) = setup(MaskPolicy::UntilHandled);
    let predicate = start_x();
    let id = predicate.id().to_string();
    let stream = engine.monitor([predicate.clone()]).unwrap();

    regions.enter(&chatillon().identifier());
    let triggered = stream.recv_timeout(WAIT).unwrap();
    assert!(triggered.is_masked());

    // The scheduled notification for the same crossing stays silent.
    assert!(predicates.deliver(&id).unwrap().is_empty());

    let handled = triggered.into_predicate();
    assert_eq!(handled, predicate);
    assert!(!predicates.masks().contains(&id));
    assert_eq!(predicates.deliver(&id), Some(PresentationOptions::full()));
}

#[test]
fn overlapping_emissions_stay_masked_until_each_is_handled() {
    let (engine, regions, predicates) = setup(MaskPolicy::UntilHandled);
    let predicate = start_x();
    let id = predicate.id().to_string();
    let stream = engine.monitor([predicate]).unwrap();

    regions.enter(&chatillon().identifier());
    regions.enter(&chatillon().identifier());
    let first = stream.recv_timeout(WAIT).unwrap();
    let second = stream.recv_timeout(WAIT).unwrap();

    let _ = first.into_predicate();
    assert!(second.is_masked());
    assert!(predicates.deliver(&id).unwrap().is_empty());

    drop(second);
    assert!(!predicates.masks().contains(&id));
    assert_eq!(predicates.deliver(&id), Some(PresentationOptions::full()));
    stream.cancel().unwrap();
}

#[test]
fn teardown_returns_only_the_session_masks() {
    let (engine, regions, predicates) = setup(MaskPolicy::UntilHandled);
    let predicate = start_x();
    let id = predicate.id().to_string();
    let stream = engine.monitor([predicate.clone()]).unwrap();

    let handled_by_app = engine.handled(&predicate);
    regions.enter(&chatillon().identifier());
    let triggered = stream.recv_timeout(WAIT).unwrap();
    assert_eq!(predicates.masks().count(&id), 2);

    stream.cancel().unwrap();
    assert!(!triggered.is_masked());
    assert_eq!(predicates.masks().count(&id), 1);

    drop(triggered);
    assert!(predicates.masks().contains(&id));
    drop(handled_by_app);
    assert!(!predicates.masks().contains(&id));
}

#[test]
fn kept_mask_lasts_until_teardown() {
    let (engine, regions, predicates) = setup(MaskPolicy::UntilHandled);
    let predicate = start_x();
    let id = predicate.id().to_string();
    let stream = engine.monitor([predicate]).unwrap();

    regions.enter(&chatillon().identifier());
    let _ = stream.recv_timeout(WAIT).unwrap().keep_masked();
    assert!(predicates.masks().contains(&id));

    stream.cancel().unwrap();
    assert!(!predicates.masks().contains(&id));
}

#[test]
fn while_active_policy_masks_for_the_whole_session() {
    let (engine, regions, predicates) = setup(MaskPolicy::WhileActive);
    let predicate = start_x();
    let id = predicate.id().to_string();
    let stream = engine.monitor([predicate]).unwrap();
    assert!(!predicates.masks().contains(&id));

    regions.enter(&chatillon().identifier());
    let triggered = stream.recv_timeout(WAIT).unwrap();
    assert!(!triggered.is_masked());
    drop(triggered);
    assert!(predicates.masks().contains(&id));

    stream.cancel().unwrap();
    assert!(!predicates.masks().contains(&id));
}

#[test]
fn disabled_policy_never_masks() {
    let (engine, regions, predicates) = setup(MaskPolicy::Disabled);
    let predicate = start_x();
    let stream = engine.monitor([predicate.clone()]).unwrap();

    regions.enter(&chatillon().identifier());
    let triggered = stream.recv_timeout(WAIT).unwrap();
    assert!(!triggered.is_masked());
    assert!(predicates.masks().snapshot().is_empty());
}

#[test]
fn when_in_use_predicates_never_mask() {
    let (engine, regions, predicates) = setup(MaskPolicy::WhileActive);
    let quiet = PositionPredicate::outside(chatillon(), Activation::WhenInUse);
    let stream = engine.monitor([quiet.clone()]).unwrap();

    regions.exit(&chatillon().identifier());
    assert_eq!(stream.recv_timeout(WAIT).unwrap().predicate(), &quiet);
    assert!(predicates.masks().snapshot().is_empty());
    assert!(!engine.handled(&quiet).is_engaged());
}

#[test]
fn foreign_category_is_presented_even_when_masked() {
    let predicates = InMemoryPredicateStore::with_category("regionwatch");
    let other = regionwatch::NativeRequest::for_predicate(&start_x(), "MessageNotification").unwrap();
    predicates.masks().insert_all([&other.identifier]);
    assert_eq!(
        predicates.masks().presentation_for(&other, "regionwatch"),
        PresentationOptions::full()
    );
}
