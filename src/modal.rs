use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::events::{EventBus, ViewEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modal {
    ImagePrompt,
    Settings,
}

/// Which dialogs are showing. Purely presentational.
pub struct ModalController {
    open: BTreeSet<Modal>,
    events: EventBus,
}

impl ModalController {
    pub fn new(events: EventBus) -> Self {
        Self {
            open: BTreeSet::new(),
            events,
        }
    }

    pub fn open(&mut self, modal: Modal) {
        if self.open.insert(modal) {
            self.events.emit(ViewEvent::ModalChanged { modal, open: true });
        }
    }

    pub fn close(&mut self, modal: Modal) {
        if self.open.remove(&modal) {
            self.events.emit(ViewEvent::ModalChanged { modal, open: false });
        }
    }

    /// The shared dismiss control closes every dialog.
    pub fn close_all(&mut self) {
        self.close(Modal::ImagePrompt);
        self.close(Modal::Settings);
    }

    pub fn is_open(&self, modal: Modal) -> bool {
        self.open.contains(&modal)
    }
}
