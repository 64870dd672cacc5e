//! Minimal typed publish/subscribe channel.

/// Handle returned by [`Event::add_listener`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<T> {
    id: ListenerId,
    once: bool,
    callback: Box<dyn FnMut(&T)>,
}

/// An observer list with synchronous fan-out in registration order.
pub struct Event<T> {
    listeners: Vec<Listener<T>>,
    next_id: u64,
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener that is called on every emit until removed.
    pub fn add_listener(&mut self, listener: impl FnMut(&T) + 'static) -> ListenerId {
        self.push(listener, false)
    }

    /// Register a listener that is removed after its first call.
    pub fn once(&mut self, listener: impl FnMut(&T) + 'static) -> ListenerId {
        self.push(listener, true)
    }

    /// Unregister a listener. Returns false if it was already gone.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Call every listener with `args`.
    pub fn emit(&mut self, args: &T) {
        for listener in &mut self.listeners {
            (listener.callback)(args);
        }
        self.listeners.retain(|l| !l.once);
    }

    fn push(&mut self, listener: impl FnMut(&T) + 'static, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Listener {
            id,
            once,
            callback: Box::new(listener),
        });
        id
    }
}
