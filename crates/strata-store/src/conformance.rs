//! Canonical scenario every store must pass.

use crate::traits::{KeyValueStore, StoreExt};

pub(crate) async fn exercise(store: &dyn KeyValueStore) {
    let key1 = "key1";
    let default = String::from("defaultValue");

    assert!(!store.contains_key(key1).await.unwrap());
    assert_eq!(store.get(key1, default.clone()).await.unwrap(), default);

    let value1 = String::from("value1");
    assert!(store.set(key1, &value1).await.unwrap().is_none());
    assert!(store.contains_key(key1).await.unwrap());
    assert_eq!(store.get(key1, default.clone()).await.unwrap(), value1);

    let value2 = String::from("value2");
    let previous = store.set(key1, &value2).await.unwrap();
    assert_eq!(previous, Some(serde_json::json!(value1)));
    assert_eq!(store.get(key1, default.clone()).await.unwrap(), value2);

    let key2 = "key2";
    store.set(key2, &value2).await.unwrap();
    let keys = store.get_all_keys().await.unwrap().unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().any(|k| k == key1));
    assert!(keys.iter().any(|k| k == key2));

    assert!(store.remove(key2).await.unwrap());
    assert!(!store.contains_key(key2).await.unwrap());
    assert!(!store.remove(key2).await.unwrap());

    store.remove_all().await.unwrap();
    assert!(!store.contains_key(key1).await.unwrap());
    assert_eq!(store.get_all_keys().await.unwrap(), Some(vec![]));
}
