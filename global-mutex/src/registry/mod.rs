// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The process-wide name to actor cache.
//!
//! Actors are created on first lookup and never torn down: the set of global mutex names used
//! by a process is small and fixed, and keeping them alive rules out races between teardown and
//! lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::actor::Actor;
use crate::internal::Mutex;
use crate::Config;
use crate::Result;

#[cfg(test)]
mod tests;

fn actors() -> &'static Mutex<HashMap<String, Arc<Actor>>> {
    static ACTORS: OnceLock<Mutex<HashMap<String, Arc<Actor>>>> = OnceLock::new();
    ACTORS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the actor serving `name`, creating it with `config` if needed.
///
/// Creation errors are returned to the caller that triggered the creation, and nothing is
/// cached in that case.
pub(crate) fn get_or_create(name: &str, config: Option<Config>) -> Result<Arc<Actor>> {
    actors().with(|actors| {
        if let Some(actor) = actors.get(name) {
            if config.is_some() {
                tracing::debug!(name, "global mutex already exists; ignoring config");
            }
            return Ok(actor.clone());
        }
        let actor = Actor::start(name, config.unwrap_or_default())?;
        actors.insert(name.to_owned(), actor.clone());
        Ok(actor)
    })
}

#[cfg(test)]
fn contains(name: &str) -> bool {
    actors().with(|actors| actors.contains_key(name))
}
