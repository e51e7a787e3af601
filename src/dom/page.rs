use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::Document;

/// Notification that the page changed outside the engine's control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice;

/// The shared page document.
///
/// Closures passed to [`Page::read`], [`Page::edit`] and [`Page::mutate`] run
/// under the page lock and must not block; callers never hold the lock across
/// an `.await`.
#[derive(Debug)]
pub struct Page {
    doc: Mutex<Document>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeNotice>>>,
}

impl Page {
    #[must_use]
    pub fn new(doc: Document) -> Self {
        Self {
            doc: Mutex::new(doc),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.doc.lock())
    }

    /// Edit the document without notifying subscribers.
    ///
    /// Used for the engine's own control insertions so they do not trigger
    /// another scan.
    pub fn edit<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.doc.lock())
    }

    /// Edit the document as the host page would, notifying subscribers.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let result = self.edit(f);
        self.subscribers
            .lock()
            .retain(|tx| tx.send(ChangeNotice).is_ok());
        result
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    #[must_use]
    pub fn location(&self) -> String {
        self.read(|doc| doc.location().to_string())
    }

    /// Client-side navigation: the URL changes, the DOM is kept.
    pub fn navigate(&self, location: &str) {
        self.mutate(|doc| doc.set_location(location));
    }
}
