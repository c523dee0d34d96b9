// Copyright (c) 2022 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://github.com/mintlayer/mintlayer-core/blob/master/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

pub type EventHandler<E> = Arc<dyn Fn(E) + Send + Sync>;

/// A list of subscribers that can be notified of events of type `E`.
pub struct EventsController<E> {
    event_subscribers: Vec<EventHandler<E>>,
}

impl<E> Default for EventsController<E> {
    fn default() -> Self {
        Self {
            event_subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> EventsController<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribers(&self) -> &Vec<EventHandler<E>> {
        &self.event_subscribers
    }

    pub fn subscribe_to_events(&mut self, handler: EventHandler<E>) {
        self.event_subscribers.push(handler)
    }

    pub fn broadcast(&self, event: E) {
        self.event_subscribers.iter().for_each(|f| f(event.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn broadcast_reaches_all_subscribers() {
        let received: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let mut controller = EventsController::new();

        for _ in 0..3 {
            let received = Arc::clone(&received);
            controller.subscribe_to_events(Arc::new(move |e| received.lock().unwrap().push(e)));
        }

        controller.broadcast(7);
        assert_eq!(*received.lock().unwrap(), vec![7, 7, 7]);
    }
}
