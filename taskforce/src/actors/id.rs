use std::cmp;
use std::fmt;
use std::hash;
use std::sync::Arc;

use uuid::Uuid;

#[derive(Debug)]
struct InnerId {
    uuid: Uuid,
    runtime_uuid: Uuid,
    class: Arc<str>,
    name: Option<String>,
}

#[derive(Clone)]
pub struct ActorId {
    data: Arc<InnerId>,
}

impl ActorId {
    pub(crate) fn new(class: Arc<str>, name: Option<String>, runtime_uuid: Uuid) -> ActorId {
        ActorId {
            data: Arc::new(InnerId {
                uuid: Uuid::new_v4(),
                runtime_uuid,
                class,
                name,
            })
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.data.uuid
    }

    pub fn class(&self) -> &str {
        &self.data.class
    }

    pub fn name(&self) -> Option<&str> {
        self.data.name.as_deref()
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, formatter: &'_ mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "ActorId{{id: {}, runtime_uuid: {}, class: {}, name: {:?}}}",
            self.data.uuid,
            self.data.runtime_uuid,
            self.data.class,
            self.data.name
        )
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data.name {
            Some(name) => write!(f, "{}({}):{}", self.data.class, name, self.data.uuid),
            None => write!(f, "{}:{}", self.data.class, self.data.uuid),
        }
    }
}

impl hash::Hash for ActorId {
    fn hash<H: hash::Hasher>(&self, state: &'_ mut H) {
        self.data.uuid.hash(state);
        self.data.runtime_uuid.hash(state);
    }
}

impl cmp::PartialEq for ActorId {
    fn eq(&self, other: &Self) -> bool {
        self.data.uuid == other.data.uuid && self.data.runtime_uuid == other.data.runtime_uuid
    }
}

impl cmp::Eq for ActorId {}
