//! Both vectors serialize as plain sequences.

use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};

use crate::{RrbVector, Vector};

fn serialize_seq<'a, T, S, I>(serializer: S, len: usize, elts: I) -> Result<S::Ok, S::Error>
where
    T: Serialize + 'a,
    S: Serializer,
    I: IntoIterator<Item = &'a T>,
{
    let mut seq = serializer.serialize_seq(Some(len))?;
    for elt in elts {
        seq.serialize_element(elt)?;
    }
    seq.end()
}

impl<T: Serialize> Serialize for Vector<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_seq(serializer, self.len(), self)
    }
}

impl<T: Serialize> Serialize for RrbVector<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_seq(serializer, self.len(), self)
    }
}

impl<'de, T: Clone + Deserialize<'de>> Deserialize<'de> for Vector<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec: Vec<T> = Vec::deserialize(deserializer)?;
        Ok(vec.into_iter().collect())
    }
}

impl<'de, T: Clone + Deserialize<'de>> Deserialize<'de> for RrbVector<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec: Vec<T> = Vec::deserialize(deserializer)?;
        Ok(vec.into_iter().collect())
    }
}
