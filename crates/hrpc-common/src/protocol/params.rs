//! Parameter lists and their wire type names.
//!
//! The server resolves a handler by the exact sequence of parameter type names,
//! so both sides must agree on how a Rust type is named. [`WireType`] gives
//! each type a stable, language-neutral name instead of relying on
//! `std::any::type_name`, whose output is not guaranteed to be stable.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use super::error::{HrpcError, Result};
use crate::transport::codec::PayloadCodec;

/// A type that can travel as an RPC parameter.
pub trait WireType {
    fn wire_name() -> Cow<'static, str>;
}

macro_rules! impl_wire_scalar {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl WireType for $ty {
                fn wire_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }
            }
        )*
    };
}

impl_wire_scalar!(
    () => "unit",
    bool => "bool",
    char => "char",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    f32 => "f32",
    f64 => "f64",
    String => "string",
);

impl<T: WireType> WireType for Vec<T> {
    fn wire_name() -> Cow<'static, str> {
        Cow::Owned(format!("list<{}>", T::wire_name()))
    }
}

impl<T: WireType> WireType for Option<T> {
    fn wire_name() -> Cow<'static, str> {
        Cow::Owned(format!("option<{}>", T::wire_name()))
    }
}

impl<T: WireType> WireType for HashMap<String, T> {
    fn wire_name() -> Cow<'static, str> {
        Cow::Owned(format!("map<string,{}>", T::wire_name()))
    }
}

impl<T: WireType> WireType for BTreeMap<String, T> {
    fn wire_name() -> Cow<'static, str> {
        Cow::Owned(format!("map<string,{}>", T::wire_name()))
    }
}

/// Names a user type for use as an RPC parameter.
///
/// The one-argument form uses the type's own name. The two-argument form
/// picks the name explicitly. Both only work for types defined in the calling
/// crate; containers such as `Vec<Point>` are already named by their element
/// type (`list<Point>`).
///
/// ```
/// use hrpc_common::protocol::params::WireType;
/// use hrpc_common::wire_type;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Point { x: i32, y: i32 }
///
/// #[derive(Serialize, Deserialize)]
/// struct Polyline(Vec<Point>);
///
/// wire_type!(Point);
/// wire_type!(Polyline, "polyline");
///
/// assert_eq!(Vec::<Point>::wire_name(), "list<Point>");
/// assert_eq!(Polyline::wire_name(), "polyline");
/// ```
#[macro_export]
macro_rules! wire_type {
    ($ty:ty) => {
        $crate::wire_type!($ty, stringify!($ty));
    };
    ($ty:ty, $name:expr) => {
        impl $crate::protocol::params::WireType for $ty {
            fn wire_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed($name)
            }
        }
    };
}

/// An ordered parameter list, implemented for tuples of [`WireType`] values.
pub trait Params: Sized + Send + 'static {
    fn type_names() -> Vec<String>;

    fn encode(&self, codec: &PayloadCodec) -> Result<Vec<Vec<u8>>>;

    fn decode(codec: &PayloadCodec, parameters: &[Vec<u8>]) -> Result<Self>;
}

macro_rules! impl_params {
    ($len:expr; $($name:ident : $idx:tt),*) => {
        impl<$($name),*> Params for ($($name,)*)
        where
            $($name: WireType + Serialize + DeserializeOwned + Send + 'static),*
        {
            fn type_names() -> Vec<String> {
                vec![$($name::wire_name().into_owned()),*]
            }

            #[allow(unused_variables)]
            fn encode(&self, codec: &PayloadCodec) -> Result<Vec<Vec<u8>>> {
                Ok(vec![$(codec.serialize(&self.$idx)?),*])
            }

            #[allow(unused_variables)]
            fn decode(codec: &PayloadCodec, parameters: &[Vec<u8>]) -> Result<Self> {
                if parameters.len() != $len {
                    return Err(HrpcError::InvalidRequest(format!(
                        "expected {} parameters, got {}",
                        $len,
                        parameters.len()
                    )));
                }
                Ok(($(codec.deserialize::<$name>(&parameters[$idx])?,)*))
            }
        }
    };
}

impl_params!(0;);
impl_params!(1; A: 0);
impl_params!(2; A: 0, B: 1);
impl_params!(3; A: 0, B: 1, C: 2);
impl_params!(4; A: 0, B: 1, C: 2, D: 3);
impl_params!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_params!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    crate::wire_type!(Point);

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Polyline(Vec<Point>);

    crate::wire_type!(Polyline, "polyline");

    #[test]
    fn test_explicit_name_for_local_newtype() {
        assert_eq!(Polyline::wire_name(), "polyline");
        assert_eq!(<Vec<Point>>::wire_name(), "list<Point>");
        assert_eq!(<(Polyline,)>::type_names(), vec!["polyline".to_string()]);
    }

    #[test]
    fn test_scalar_and_composite_names() {
        assert_eq!(String::wire_name(), "string");
        assert_eq!(<Vec<Option<i64>>>::wire_name(), "list<option<i64>>");
        assert_eq!(<HashMap<String, bool>>::wire_name(), "map<string,bool>");
        assert_eq!(Point::wire_name(), "Point");
    }

    #[test]
    fn test_tuple_type_names_keep_order() {
        assert_eq!(
            <(String, i32, Point)>::type_names(),
            vec!["string".to_string(), "i32".to_string(), "Point".to_string()]
        );
        assert!(<()>::type_names().is_empty());
    }

    #[test]
    fn test_params_encode_decode() {
        let codec = PayloadCodec::default();
        let params = ("hi".to_string(), 7u32, Point { x: 1, y: -2 });

        let encoded = params.encode(&codec).unwrap();
        assert_eq!(encoded.len(), 3);

        let decoded = <(String, u32, Point)>::decode(&codec, &encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_decode_rejects_wrong_arity() {
        let codec = PayloadCodec::default();
        let encoded = ("only".to_string(),).encode(&codec).unwrap();

        let result = <(String, String)>::decode(&codec, &encoded);
        assert!(matches!(result, Err(HrpcError::InvalidRequest(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_type() {
        let codec = PayloadCodec::json();
        let encoded = ("not a number".to_string(),).encode(&codec).unwrap();

        assert!(<(u64,)>::decode(&codec, &encoded).is_err());
    }
}
