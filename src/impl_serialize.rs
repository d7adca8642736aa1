use serde::de::{Deserialize, Deserializer, Error, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use std::fmt;

use crate::dim::Dimension;
use crate::shape::{RankedShape, Shape};
use crate::value_range::ValueRange;

/// Serialized form of a [`ValueRange`]. Infinite bounds are omitted, since
/// formats such as JSON cannot represent them.
#[derive(serde::Serialize, serde::Deserialize)]
struct RangeBounds {
    min: Option<f64>,
    max: Option<f64>,
}

impl Serialize for ValueRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let finite = |x: f64| x.is_finite().then_some(x);
        RangeBounds {
            min: finite(self.min()),
            max: finite(self.max()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValueRange {
    fn deserialize<D>(deserializer: D) -> Result<ValueRange, D::Error>
    where
        D: Deserializer<'de>,
    {
        let RangeBounds { min, max } = RangeBounds::deserialize(deserializer)?;
        let min = min.unwrap_or(f64::NEG_INFINITY);
        let max = max.unwrap_or(f64::INFINITY);
        if min.is_nan() || max.is_nan() || min > max {
            return Err(D::Error::custom(format!("invalid range [{min}, {max}]")));
        }
        Ok(ValueRange::new(min, max))
    }
}

/// Fixed dimensions serialize as integers, unknown dimensions as none and
/// symbolic dimensions as their rendered expression.
impl Serialize for Dimension {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Dimension::Fixed(value) => serializer.serialize_i64(*value),
            Dimension::Unknown => serializer.serialize_none(),
            Dimension::Dynamic(_) => serializer.collect_str(self),
        }
    }
}

impl Serialize for RankedShape {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.iter())
    }
}

/// Ranked shapes serialize as a list of dimensions. Other shapes serialize
/// as their rendered form.
impl Serialize for Shape {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Shape::Ranked(shape) => shape.serialize(serializer),
            _ => serializer.collect_str(self),
        }
    }
}

struct RankedShapeVisitor;

impl<'de> Visitor<'de> for RankedShapeVisitor {
    type Value = RankedShape;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a list of integer or null dimension sizes")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut dims = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(size) = seq.next_element::<Option<i64>>()? {
            dims.push(size.map_or(Dimension::Unknown, Dimension::Fixed));
        }
        Ok(RankedShape::new(dims))
    }
}

impl<'de> Deserialize<'de> for RankedShape {
    fn deserialize<D>(deserializer: D) -> Result<RankedShape, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(RankedShapeVisitor)
    }
}
