// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests for clone-with-updates.

use loom_bridge::{MutationTranslator, RootContext};
use loom_bridge_proto::{diff_properties, Properties, PropertyValue, ReconcilerMode};
use loom_host_memory::{ClonePolicy, MemoryHost};
use loom_host_port::HostGateway;
use proptest::prelude::*;

const KEYS: [&str; 6] = ["color", "size", "label", "onPress", "hidden", "weight"];

fn value() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        "[a-z]{0,8}".prop_map(PropertyValue::String),
        (-1.0e6..1.0e6f64).prop_map(PropertyValue::Number),
        any::<bool>().prop_map(PropertyValue::Bool),
        Just(PropertyValue::Function),
        Just(PropertyValue::Undefined),
    ]
}

fn props() -> impl Strategy<Value = Properties> {
    prop::collection::btree_map(prop::sample::select(KEYS.to_vec()).prop_map(String::from), value(), 0..KEYS.len())
}

fn payload() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(KEYS.to_vec(), 0..=KEYS.len())
        .prop_map(|keys| keys.into_iter().map(String::from).collect())
}

fn committed(old: &Properties, policy: ClonePolicy) -> (MutationTranslator<MemoryHost>, loom_bridge_proto::Instance) {
    let mut host = MemoryHost::new(policy);
    host.open_view(ReconcilerMode::Legacy, "props");
    let container = host.get_container().expect("container");
    let mut translator = MutationTranslator::new(host);
    translator.adopt(&container);

    let mut ctx = RootContext::new();
    let parent = translator
        .create_instance(&mut ctx, "Box", old.clone())
        .expect("create parent");
    let child = translator
        .create_text_instance(&mut ctx, "kid")
        .expect("create child");
    let parent = translator.append_initial_child(parent, child);
    translator
        .replace_container_children(&container, std::slice::from_ref(&parent))
        .expect("commit");
    (translator, parent)
}

proptest! {
    #[test]
    fn listed_keys_come_from_new_props_everything_else_from_old(
        old in props(),
        new in props(),
        update in payload(),
        keep_children in any::<bool>(),
        fresh in any::<bool>(),
    ) {
        let policy = if fresh { ClonePolicy::FreshIdentity } else { ClonePolicy::InPlace };
        let (mut translator, parent) = committed(&old, policy);
        let cloned = translator
            .clone_instance(&parent, &update, "Box", &old, &new, keep_children)
            .expect("clone");

        for key in KEYS {
            let expected = if update.iter().any(|k| k == key) { new.get(key) } else { old.get(key) };
            prop_assert_eq!(cloned.widget_properties.get(key), expected, "key {}", key);
        }
        if keep_children {
            prop_assert_eq!(&cloned.widget_children, &parent.widget_children);
        } else {
            prop_assert!(cloned.widget_children.is_empty());
        }
        prop_assert!(translator.index().contains(cloned.widget_id));
    }

    #[test]
    fn diff_payload_turns_old_into_new(old in props(), new in props()) {
        let (mut translator, parent) = committed(&old, ClonePolicy::InPlace);
        let update = diff_properties(&old, &new).unwrap_or_default();
        let cloned = translator
            .commit_update(&parent, &update, "Box", &old, &new)
            .expect("commit update");
        prop_assert_eq!(&cloned.widget_properties, &new);
        prop_assert_eq!(cloned.widget_id, parent.widget_id);
    }
}

#[test]
fn documented_clone_example() {
    let mut old = Properties::new();
    old.insert("color".into(), "red".into());
    old.insert("size".into(), 10.0.into());
    let mut new = Properties::new();
    new.insert("color".into(), "blue".into());
    new.insert("size".into(), 99.0.into());

    let (mut translator, parent) = committed(&old, ClonePolicy::InPlace);
    let cloned = translator
        .clone_instance(&parent, &["color".to_string()], "Box", &old, &new, true)
        .expect("clone");

    assert_eq!(cloned.widget_properties.get("color"), Some(&PropertyValue::from("blue")));
    assert_eq!(cloned.widget_properties.get("size"), Some(&PropertyValue::Number(10.0)));
    assert_eq!(cloned.widget_children, parent.widget_children);
}
