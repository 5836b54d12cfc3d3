//! Core command coverage over a single healthy group.
#![cfg(test)]

use std::sync::{Arc, Mutex};

use moray_client::{Client, Error, GroupConfig, Options, StoreReply};

use crate::helpers::{FakeOptions, FakeServer, Store};

fn single_group(server: &FakeServer) -> Vec<GroupConfig> {
    vec![GroupConfig::from_endpoints(vec![server.endpoint()])]
}

fn client(server: &FakeServer) -> Client {
    Client::connect(single_group(server), Options::default()).unwrap()
}

#[test]
fn namespaced_set_hits_the_wire_verbatim() {
    let recorder = Arc::new(Mutex::new(Vec::new()));
    let server = FakeServer::spawn(FakeOptions {
        recorder: Some(recorder.clone()),
        ..FakeOptions::default()
    });
    let options = Options {
        namespace: Some("my_namespace".into()),
        ..Options::default()
    };
    let client = Client::connect(single_group(&server), options).unwrap();

    assert_eq!(
        client.set("key", b"value", 0).unwrap(),
        Some(StoreReply::Stored)
    );

    let bytes = recorder.lock().unwrap().clone();
    let wire = String::from_utf8_lossy(&bytes).into_owned();
    assert!(
        wire.contains("set my_namespace:key 0 0 5\r\nvalue\r\n"),
        "wire was: {wire:?}"
    );

    assert_eq!(client.get("key").unwrap().as_deref(), Some(&b"value"[..]));
}

#[test]
fn binary_values_round_trip() {
    let server = FakeServer::master();
    let client = client(&server);

    // payload containing CRLFs and every byte value
    let mut value = Vec::new();
    for _ in 0..4 {
        value.extend(0u8..=255);
    }
    value.extend_from_slice(b"\r\nEND\r\n");

    client.set("blob", &value, 0).unwrap();
    assert_eq!(client.get("blob").unwrap().as_deref(), Some(&value[..]));
}

#[test]
fn empty_value_round_trips() {
    let server = FakeServer::master();
    let client = client(&server);
    client.set("empty", b"", 0).unwrap();
    assert_eq!(client.get("empty").unwrap().as_deref(), Some(&b""[..]));
}

#[test]
fn miss_is_none_not_an_error() {
    let server = FakeServer::master();
    let client = client(&server);
    assert_eq!(client.get("absent").unwrap(), None);
}

#[test]
fn raw_variants_round_trip() {
    let server = FakeServer::master();
    let client = client(&server);
    client.set_raw("raw", b"\x00\x01\x02", 0).unwrap();
    assert_eq!(
        client.get_raw("raw").unwrap().as_deref(),
        Some(&b"\x00\x01\x02"[..])
    );
}

#[test]
fn add_only_stores_absent_keys() {
    let server = FakeServer::master();
    let client = client(&server);

    assert_eq!(client.add("k", b"v1", 0).unwrap(), Some(StoreReply::Stored));
    assert_eq!(
        client.add("k", b"v2", 0).unwrap(),
        Some(StoreReply::NotStored)
    );
    assert_eq!(client.get("k").unwrap().as_deref(), Some(&b"v1"[..]));
}

#[test]
fn replace_only_stores_existing_keys() {
    let server = FakeServer::master();
    let client = client(&server);

    assert_eq!(
        client.replace("k", b"v", 0).unwrap(),
        Some(StoreReply::NotStored)
    );
    client.set("k", b"v", 0).unwrap();
    assert_eq!(
        client.replace("k", b"v2", 0).unwrap(),
        Some(StoreReply::Stored)
    );
    assert_eq!(client.get("k").unwrap().as_deref(), Some(&b"v2"[..]));
}

#[test]
fn append_and_prepend_edit_in_place() {
    let server = FakeServer::master();
    let client = client(&server);

    assert_eq!(
        client.append("k", b"tail").unwrap(),
        Some(StoreReply::NotStored)
    );
    client.set("k", b"mid", 0).unwrap();
    client.append("k", b"-tail").unwrap();
    client.prepend("k", b"head-").unwrap();
    assert_eq!(
        client.get("k").unwrap().as_deref(),
        Some(&b"head-mid-tail"[..])
    );
}

#[test]
fn counters_wrap_the_wire_protocol() {
    let server = FakeServer::master();
    let client = client(&server);

    assert_eq!(client.incr("n", 1).unwrap(), None);
    client.set("n", b"5", 0).unwrap();
    assert_eq!(client.incr("n", 3).unwrap(), Some(8));
    assert_eq!(client.decr("n", 20).unwrap(), Some(0));
    assert_eq!(client.decr("missing", 1).unwrap(), None);
}

#[test]
fn delete_reports_prior_existence() {
    let server = FakeServer::master();
    let client = client(&server);

    client.set("k", b"v", 0).unwrap();
    assert_eq!(client.delete("k").unwrap(), Some(true));
    assert_eq!(client.delete("k").unwrap(), Some(false));
    assert_eq!(client.get("k").unwrap(), None);
}

#[test]
fn cas_replaces_unmodified_values() {
    let server = FakeServer::master();
    let client = client(&server);

    client.set("k", b"1", 0).unwrap();
    let reply = client
        .cas("k", 0, |old| {
            let mut next = old.to_vec();
            next.extend_from_slice(b"1");
            next
        })
        .unwrap();
    assert_eq!(reply, Some(StoreReply::Stored));
    assert_eq!(client.get("k").unwrap().as_deref(), Some(&b"11"[..]));
}

#[test]
fn cas_on_missing_key_is_none() {
    let server = FakeServer::master();
    let client = client(&server);
    assert_eq!(client.cas("ghost", 0, |v| v.to_vec()).unwrap(), None);
}

#[test]
fn cas_loses_to_a_concurrent_writer() {
    let server = FakeServer::master();
    let client = client(&server);

    client.set("k", b"old", 0).unwrap();
    let store = server.store().clone();
    let reply = client
        .cas("k", 0, move |_| {
            // another writer lands between our gets and our cas
            store.seed("k", b"intruder");
            b"mine".to_vec()
        })
        .unwrap();
    assert_eq!(reply, Some(StoreReply::Exists));
    assert_eq!(client.get("k").unwrap().as_deref(), Some(&b"intruder"[..]));
}

#[test]
fn no_reply_writes_return_none() {
    let server = FakeServer::master();
    let options = Options {
        no_reply: true,
        ..Options::default()
    };
    let client = Client::connect(single_group(&server), options).unwrap();

    assert_eq!(client.set("k", b"v", 0).unwrap(), None);
    assert_eq!(client.delete("missing").unwrap(), None);
    // retrievals still read responses
    assert_eq!(client.get("k").unwrap().as_deref(), Some(&b"v"[..]));
}

#[test]
fn oversize_values_are_rejected_before_any_write() {
    let server = FakeServer::master();
    let client = client(&server);

    let value = vec![b'v'; 1_048_577];
    let err = client.set("big", &value, 0).unwrap_err();
    assert!(matches!(err, Error::ValueTooLarge { .. }));
    assert!(err.to_string().contains("Value too large"));
    assert!(!server.store().contains("big"));

    // exactly at the limit is allowed
    let value = vec![b'v'; 1_048_576];
    assert_eq!(
        client.set("fits", &value, 0).unwrap(),
        Some(StoreReply::Stored)
    );
}

#[test]
fn fetch_produces_on_miss_and_reuses_on_hit() {
    let server = FakeServer::master();
    let client = client(&server);

    let value = client.fetch("k", 0, || b"produced".to_vec()).unwrap();
    assert_eq!(&value[..], b"produced");

    // second fetch hits; the producer must not run
    let value = client
        .fetch("k", 0, || panic!("producer ran on a hit"))
        .unwrap();
    assert_eq!(&value[..], b"produced");
}

#[test]
fn fetch_concurrent_writer_wins_the_store() {
    let server = FakeServer::master();
    let client = client(&server);

    // the key appears between the get and the add: fetch still hands the
    // caller its produced value, but the concurrent writer keeps the store
    let store = server.store().clone();
    let produced = client
        .fetch("k", 0, move || {
            store.seed("k", b"theirs");
            b"mine".to_vec()
        })
        .unwrap();
    assert_eq!(&produced[..], b"mine");
    assert_eq!(server.store().get("k").as_deref(), Some(&b"theirs"[..]));
}

#[test]
fn reads_round_robin_across_replicas() {
    let store = Store::shared();
    let master = FakeServer::spawn(FakeOptions {
        store: store.clone(),
        ..FakeOptions::default()
    });
    let slave = FakeServer::slave(store.clone());

    let group = GroupConfig::new("main", 1, vec![slave.endpoint(), master.endpoint()]);
    let client = Client::connect(vec![group], Options::default()).unwrap();

    client.set("k", b"v", 0).unwrap();
    // both members of the rotation serve the shared keyspace
    for _ in 0..4 {
        assert_eq!(client.get("k").unwrap().as_deref(), Some(&b"v"[..]));
    }
}

#[test]
fn get_multi_merges_and_unnamespaces() {
    let server = FakeServer::master();
    let options = Options {
        namespace: Some("ns".into()),
        ..Options::default()
    };
    let client = Client::connect(single_group(&server), options).unwrap();

    client.set("a", b"1", 0).unwrap();
    client.set("b", b"2", 0).unwrap();

    let found = client.get_multi(&["a", "b", "missing"]).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(&found["a"][..], b"1");
    assert_eq!(&found["b"][..], b"2");
    assert!(!found.contains_key("missing"));
}
