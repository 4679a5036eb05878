mod common;

use axum::http::StatusCode;
use common::{ids, TestApp};
use futures::future::join_all;
use serde_json::json;

use kennel_api::database::models::{Dog, Litter, ParentRef, Sex};
use kennel_api::database::{Scope, Store};
use kennel_api::services::AssociationMaintainer;

const PUPS: usize = 32;

fn pup(i: usize) -> Dog {
    Dog {
        id: format!("pup-{i:02}"),
        name: format!("Pup {i}"),
        breed: String::new(),
        color: String::new(),
        sex: Sex::Unknown,
        weight: 0,
        primary_image: None,
        breeder_id: "fred".to_string(),
        litter_id: String::new(),
        deleted_at: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attaches_never_lose_a_pup() {
    let store = Store::memory();
    store
        .litters
        .create(Litter {
            id: "l1".to_string(),
            breeder_id: "fred".to_string(),
            count: 0,
            dam: ParentRef {
                id: None,
                name: Some("Bella".to_string()),
            },
            sire: None,
            pups: Vec::new(),
            deleted_at: None,
        })
        .await
        .unwrap();
    for i in 0..PUPS {
        store.dogs.create(pup(i)).await.unwrap();
    }

    let associations = AssociationMaintainer::new(store.clone());
    let tasks = (0..PUPS).map(|i| {
        let associations = associations.clone();
        tokio::spawn(async move {
            associations
                .attach_pup_to_litter(&format!("pup-{i:02}"), "l1")
                .await
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let litter = store.litters.find_by_id("l1", Scope::Active).await.unwrap().unwrap();
    assert_eq!(litter.pups.len(), PUPS);
    for dog in store.dogs.find_all(&kennel_api::database::AssetFilter::All, Scope::Active).await.unwrap() {
        assert_eq!(dog.litter_id, "l1");
        assert!(litter.has_pup(&dog.id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_puts_keep_both_sides_consistent() {
    let app = TestApp::new().await;
    let fred = app.breeder("fred", "fred@astaire.com").await;
    app.litter(&fred, json!({"id": "l1", "breederId": "fred", "dam": {"name": "Bella"}}))
        .await;
    for i in 0..8 {
        app.dog(&fred, json!({"id": format!("d{i}"), "name": format!("Dog {i}"), "breederId": "fred"}))
            .await;
    }

    let puts = (0..8).map(|i| {
        let uri = format!("/dogs/d{i}");
        let token = fred.clone();
        let app = &app;
        async move { app.put(&uri, Some(&token), json!({"litterId": "l1"})).await }
    });
    for res in join_all(puts).await {
        assert_eq!(res.status, StatusCode::OK, "{:?}", res.body);
    }

    let res = app.get("/litters/l1", Some(&fred)).await;
    let expected: Vec<String> = (0..8).map(|i| format!("d{i}")).collect();
    assert_eq!(ids(&res.data()["pups"]), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_claim_an_email_once() {
    let app = TestApp::new().await;
    let registrations = (0..8).map(|i| {
        let app = &app;
        async move {
            app.post(
                "/breeders",
                None,
                json!({
                    "id": format!("fred{i}"),
                    "firstname": "Fred",
                    "lastname": "Astaire",
                    "email": "fred@astaire.com",
                    "password": "tophat"
                }),
            )
            .await
        }
    });
    let results = join_all(registrations).await;

    let created = results.iter().filter(|r| r.status == StatusCode::CREATED).count();
    assert_eq!(created, 1, "{:?}", results.iter().map(|r| &r.body).collect::<Vec<_>>());
    for res in results.iter().filter(|r| r.status != StatusCode::CREATED) {
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{:?}", res.body);
    }

    let holders = app
        .store
        .breeders
        .find_all(
            &kennel_api::database::AssetFilter::field("email", "fred@astaire.com"),
            Scope::Active,
        )
        .await
        .unwrap();
    assert_eq!(holders.len(), 1);
}
