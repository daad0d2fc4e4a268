//! The host side of a test: recorded callbacks and a polling loop.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rsws_bridge::{Handlers, SessionRegistry};

/// Records every callback as a short string, e.g. `"message:hi"`.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers that only record.
    pub fn handlers(&self) -> Handlers {
        let (connect, message, binary, error, disconnect) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );
        Handlers::new()
            .on_connect(move |_| connect.push("connect".into()))
            .on_message(move |_, text| message.push(format!("message:{text}")))
            .on_binary(move |_, data| binary.push(format!("binary:{data:?}")))
            .on_error(move |_, msg| error.push(format!("error:{msg}")))
            .on_disconnect(move |_, reason| disconnect.push(format!("disconnect:{reason}")))
    }

    pub fn push(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    pub fn events(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.log.borrow().iter().any(|e| e == entry)
    }
}

/// Poll `registry` like a host tick loop until `done` holds.
///
/// Returns `false` if ten seconds pass first.
pub fn pump(registry: &SessionRegistry, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        registry.poll();
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
