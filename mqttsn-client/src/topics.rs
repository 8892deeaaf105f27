use crate::packet::Publish;

/// Invoked for every inbound PUBLISH on a subscribed topic.
pub type TopicCallback = fn(&Publish) -> i32;

/// How many topic slots are reserved up front, and the growth increment.
pub const INITIAL_TOPIC_CAPACITY: usize = 5;

/// Wildcard class of a stored topic name, taken from its last character.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Wildcard {
    /// `+`: matches one more topic level.
    SingleLevel,
    /// `#`: matches any remainder.
    MultiLevel,
}

/// One registry entry. `id == 0` means the gateway has not assigned a
/// numeric id yet; wildcard entries never receive one.
#[derive(Debug, Clone)]
pub struct Topic {
    name: String,
    id: u16,
    callback: Option<TopicCallback>,
}

impl Topic {
    fn new(name: &str) -> Self {
        Topic {
            name: name.to_owned(),
            id: 0,
            callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn callback(&self) -> Option<TopicCallback> {
        self.callback
    }

    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    pub fn set_callback(&mut self, callback: TopicCallback) {
        self.callback = Some(callback);
    }

    /// The wildcard class, if the stored name ends in `+` or `#`.
    pub fn wildcard(&self) -> Option<Wildcard> {
        match self.name.as_bytes().last() {
            Some(b'+') => Some(Wildcard::SingleLevel),
            Some(b'#') => Some(Wildcard::MultiLevel),
            _ => None,
        }
    }

    /// Whether `name` falls under this entry's pattern. Non-wildcard
    /// entries match on byte equality only.
    pub fn matches(&self, name: &str) -> bool {
        let pattern = self.name.as_bytes();
        let candidate = name.as_bytes();

        match self.wildcard() {
            Some(Wildcard::SingleLevel) => {
                let prefix = &pattern[..pattern.len() - 1];
                candidate.starts_with(prefix) && !candidate[prefix.len()..].contains(&b'/')
            }
            Some(Wildcard::MultiLevel) => candidate.starts_with(&pattern[..pattern.len() - 1]),
            None => pattern == candidate,
        }
    }
}

/// Append-only topic registry mapping names to gateway-assigned ids and
/// per-topic callbacks. Tables stay small on the target hardware, so
/// lookups are linear scans.
pub struct TopicTable {
    topics: Vec<Topic>,
}

impl Default for TopicTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicTable {
    pub fn new() -> Self {
        TopicTable {
            topics: Vec::with_capacity(INITIAL_TOPIC_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Inserts `name` unless an exact match already exists; returns the
    /// entry either way.
    pub fn add(&mut self, name: &str) -> &mut Topic {
        let pos = match self.topics.iter().position(|topic| topic.name == name) {
            Some(pos) => pos,
            None => {
                if self.topics.len() == self.topics.capacity() {
                    self.topics.reserve(INITIAL_TOPIC_CAPACITY);
                }
                self.topics.push(Topic::new(name));
                self.topics.len() - 1
            }
        };
        &mut self.topics[pos]
    }

    /// Inserts an entry for a topic id known to both sides without
    /// registration.
    pub fn add_predefined(&mut self, id: u16, callback: TopicCallback) {
        let mut topic = Topic::new("");
        topic.set_id(id);
        topic.set_callback(callback);
        self.topics.push(topic);
    }

    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.name == name)
    }

    pub fn get_by_id(&self, id: u16) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.id == id)
    }

    /// The registered id for `name`, or zero when unknown.
    pub fn topic_id(&self, name: &str) -> u16 {
        self.get(name).map_or(0, Topic::id)
    }

    /// Records a gateway-assigned id on an existing entry.
    pub fn set_id(&mut self, name: &str, id: u16) -> bool {
        match self.topics.iter_mut().find(|topic| topic.name == name) {
            Some(topic) => {
                topic.set_id(id);
                true
            }
            None => false,
        }
    }

    pub fn set_callback(&mut self, name: &str, callback: TopicCallback) -> bool {
        match self.topics.iter_mut().find(|topic| topic.name == name) {
            Some(topic) => {
                topic.set_callback(callback);
                true
            }
            None => false,
        }
    }

    pub fn set_callback_by_id(&mut self, id: u16, callback: TopicCallback) -> bool {
        match self.topics.iter_mut().find(|topic| topic.id == id) {
            Some(topic) => {
                topic.set_callback(callback);
                true
            }
            None => false,
        }
    }

    /// Dispatches an inbound publish to the callback registered for its
    /// topic id; returns 0 when no callback is registered.
    pub fn exec_callback(&self, id: u16, publish: &Publish) -> i32 {
        self.get_by_id(id)
            .and_then(Topic::callback)
            .map_or(0, |callback| callback(publish))
    }

    /// The first wildcard entry whose pattern covers `name`.
    pub fn wildcard_match(&self, name: &str) -> Option<&Topic> {
        self.topics
            .iter()
            .filter(|topic| topic.wildcard().is_some())
            .find(|topic| topic.matches(name))
    }
}
