use std::cmp;
use std::fmt;
use std::hash;
use std::sync::Arc;

use uuid::Uuid;

#[derive(Debug)]
struct InnerId {
    uuid: Uuid,
    producer: Arc<str>,
}

/// Identifies one result slot in the completion table.
///
/// Equality and hashing only look at the uuid; the producer name is carried
/// along for log and error output.
#[derive(Clone)]
pub struct ObjectId {
    data: Arc<InnerId>,
}

impl ObjectId {
    pub(crate) fn new<S: Into<Arc<str>>>(producer: S) -> ObjectId {
        ObjectId {
            data: Arc::new(InnerId {
                uuid: Uuid::new_v4(),
                producer: producer.into(),
            }),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.data.uuid
    }

    /// Name of the function or actor method that produces this object.
    pub fn producer(&self) -> &str {
        &self.data.producer
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, formatter: &'_ mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "ObjectId{{id: {}, producer: {:?}}}",
            self.data.uuid,
            self.data.producer,
        )
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.data.producer, self.data.uuid)
    }
}

impl hash::Hash for ObjectId {
    fn hash<H: hash::Hasher>(&self, state: &'_ mut H) {
        self.data.uuid.hash(state);
    }
}

impl cmp::PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.data.uuid == other.data.uuid
    }
}

impl cmp::Eq for ObjectId {}
