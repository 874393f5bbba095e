/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Indexes bundles by id for server-side demultiplexing. Grounded on
//! `original_source/libcedar/bundle/bundle_collection.go`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bundle::Bundle;
use crate::error::{CoreError, CoreResult};

#[derive(Default)]
pub struct BundleCollection {
    data: RwLock<HashMap<u32, Arc<Bundle>>>,
    main: RwLock<Option<Arc<Bundle>>>,
}

impl BundleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bundle`, optionally as the collection's `main` slot (id 0
    /// on lookup resolves to whichever bundle was registered as main).
    pub fn add_bundle(&self, bundle: Arc<Bundle>, is_main: bool) -> CoreResult<()> {
        let mut data = self.data.write();
        if data.contains_key(&bundle.id) {
            return Err(CoreError::DuplicatedBundle(bundle.id));
        }
        if is_main {
            *self.main.write() = Some(bundle.clone());
        }
        data.insert(bundle.id, bundle);
        Ok(())
    }

    /// Look up a bundle by id; id 0 resolves to the `main` bundle if one was
    /// registered.
    pub fn get_bundle(&self, id: u32) -> Option<Arc<Bundle>> {
        if id == 0 {
            return self.main.read().clone();
        }
        self.data.read().get(&id).cloned()
    }

    pub fn remove_bundle(&self, id: u32) {
        self.data.write().remove(&id);
        let mut main = self.main.write();
        if main.as_ref().map(|b| b.id) == Some(id) {
            *main = None;
        }
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_duplicate_bundle_id() {
        let collection = BundleCollection::new();
        let bundle = Bundle::new(5, 10, 1, 1, 100, 200);
        collection.add_bundle(bundle.clone(), false).unwrap();
        let err = collection.add_bundle(bundle, false).unwrap_err();
        assert!(matches!(err, CoreError::DuplicatedBundle(5)));
    }

    #[tokio::test]
    async fn main_slot_resolves_id_zero() {
        let collection = BundleCollection::new();
        let bundle = Bundle::new(1, 10, 1, 1, 100, 200);
        collection.add_bundle(bundle.clone(), true).unwrap();
        assert!(collection.get_bundle(0).is_some());
        assert_eq!(collection.get_bundle(0).unwrap().id, 1);
    }

    #[tokio::test]
    async fn unknown_id_resolves_to_none() {
        let collection = BundleCollection::new();
        assert!(collection.get_bundle(99).is_none());
    }
}
