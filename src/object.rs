use crate::property::{Vector2D, WzCanvas, WzSound, WzSubProperty, WzValue};
use crate::{WzDirectory, WzFile, WzImage};

/// What a node in the tree is: a file root, a directory, an image, a
/// structured sub-object, or a plain value.
///
/// `WzObjectType` implements `From` for everything that can become one,
/// so parsing code can hand values straight to `WzNode::new`.
#[derive(Debug, Clone)]
pub enum WzObjectType {
    File(Box<WzFile>),
    Image(Box<WzImage>),
    Directory(Box<WzDirectory>),
    Property(WzSubProperty),
    Value(WzValue),
}

macro_rules! from_impl_boxed {
    ($from_type:ident, $variant:ident) => {
        impl From<$from_type> for WzObjectType {
            fn from(i: $from_type) -> Self {
                WzObjectType::$variant(Box::new(i))
            }
        }
    };
}
macro_rules! from_impl_value {
    ($from_type:ty, $variant:ident) => {
        impl From<$from_type> for WzObjectType {
            fn from(i: $from_type) -> Self {
                WzObjectType::Value(WzValue::$variant(i))
            }
        }
    };
}
macro_rules! from_impl_sub_property {
    ($from_type:ident, $variant:ident) => {
        impl From<$from_type> for WzObjectType {
            fn from(i: $from_type) -> Self {
                WzObjectType::Property(WzSubProperty::$variant(Box::new(i)))
            }
        }
    };
}

from_impl_boxed!(WzFile, File);
from_impl_boxed!(WzDirectory, Directory);
from_impl_boxed!(WzImage, Image);

from_impl_value!(i16, Short);
from_impl_value!(i32, Int);
from_impl_value!(i64, Long);
from_impl_value!(f32, Float);
from_impl_value!(f64, Double);
from_impl_value!(String, String);
from_impl_value!(Vector2D, Vector);
from_impl_value!(Vec<Vector2D>, Convex);

from_impl_sub_property!(WzCanvas, Canvas);
from_impl_sub_property!(WzSound, Sound);

impl From<WzValue> for WzObjectType {
    fn from(value: WzValue) -> Self {
        WzObjectType::Value(value)
    }
}

impl From<WzSubProperty> for WzObjectType {
    fn from(prop: WzSubProperty) -> Self {
        WzObjectType::Property(prop)
    }
}
