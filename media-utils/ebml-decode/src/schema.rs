// Copyright 2022-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Declarative mapping from element ids to struct fields.
//!
//! A type implementing [Schema] lists its fields as [FieldSpec]s. The list is
//! turned into a [Shape] (an id lookup table) the first time the type is
//! decoded and cached for the rest of the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::cursor::Element;
use crate::error::{Error, Result};
use crate::primitive::FromElement;

type Handler<T> = Box<dyn Fn(&mut T, Element<'_>) -> Result<()> + Send + Sync>;

/// A structure which can be decoded from a container element.
///
/// Usually implemented with [ebml_schema!](crate::ebml_schema).
pub trait Schema: Default + 'static {
    fn fields() -> Vec<FieldSpec<Self>>;
}

/// How a field stores what it decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single primitive value. A repeated id overwrites.
    Scalar,
    /// A single nested structure. A repeated id overwrites.
    Nested,
    /// Nested structures appended in stream order.
    Sequence,
    /// Primitive values appended in stream order.
    Repeated,
}

/// One field of a [Schema].
pub struct FieldSpec<T> {
    name: &'static str,
    tag: &'static str,
    kind: FieldKind,
    optional: bool,
    handler: Handler<T>,
}

impl<T: 'static> FieldSpec<T> {
    /// A primitive field, e.g. `FieldSpec::scalar("title", "7BA9", |s| &mut s.title)`.
    ///
    /// `tag` is a hexadecimal id, or several separated by `>` where the
    /// leading ids name wrapper elements to descend through.
    pub fn scalar<V, F>(name: &'static str, tag: &'static str, field: F) -> Self
    where
        V: FromElement + 'static,
        F: for<'t> Fn(&'t mut T) -> &'t mut V + Send + Sync + 'static,
    {
        Self::new(name, tag, FieldKind::Scalar, move |target, elem| {
            *field(target) = V::from_element(elem)?;
            Ok(())
        })
    }

    /// A nested structure held in an `Option`.
    pub fn nested<U, F>(name: &'static str, tag: &'static str, field: F) -> Self
    where
        U: Schema,
        F: for<'t> Fn(&'t mut T) -> &'t mut Option<U> + Send + Sync + 'static,
    {
        Self::new(name, tag, FieldKind::Nested, move |target, elem| {
            *field(target) = Some(crate::de::decode_element(elem)?);
            Ok(())
        })
    }

    /// A list of nested structures.
    pub fn sequence<U, F>(name: &'static str, tag: &'static str, field: F) -> Self
    where
        U: Schema,
        F: for<'t> Fn(&'t mut T) -> &'t mut Vec<U> + Send + Sync + 'static,
    {
        Self::new(name, tag, FieldKind::Sequence, move |target, elem| {
            let item = crate::de::decode_element(elem)?;
            field(target).push(item);
            Ok(())
        })
    }

    /// A list of primitive values.
    pub fn repeated<V, F>(name: &'static str, tag: &'static str, field: F) -> Self
    where
        V: FromElement + 'static,
        F: for<'t> Fn(&'t mut T) -> &'t mut Vec<V> + Send + Sync + 'static,
    {
        Self::new(name, tag, FieldKind::Repeated, move |target, elem| {
            let item = V::from_element(elem)?;
            field(target).push(item);
            Ok(())
        })
    }

    fn new<H>(name: &'static str, tag: &'static str, kind: FieldKind, handler: H) -> Self
    where
        H: Fn(&mut T, Element<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name,
            tag,
            kind,
            optional: false,
            handler: Box::new(handler),
        }
    }

    /// Mark the field as allowed to be absent.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl<T> FieldSpec<T> {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tag
    }
    #[inline]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }
    #[inline]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub(crate) fn decode(&self, target: &mut T, elem: Element<'_>) -> Result<()> {
        (self.handler)(target, elem)
    }
}

impl<T> std::fmt::Debug for FieldSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .finish()
    }
}

/// The resolved lookup table for a [Schema].
pub struct Shape<T> {
    type_name: &'static str,
    fields: Vec<FieldSpec<T>>,
    /// parsed id path of each field, same order as `fields`
    paths: Vec<Vec<u64>>,
    /// first id of each path to the fields starting with it
    heads: HashMap<u64, Vec<usize>>,
}

impl<T: Schema> Shape<T> {
    fn build() -> Result<Self> {
        let type_name = std::any::type_name::<T>();
        let unsupported = |reason: String| Error::UnsupportedShape { type_name, reason };

        let fields = T::fields();
        let mut paths: Vec<Vec<u64>> = Vec::with_capacity(fields.len());
        for field in fields.iter() {
            let path = parse_tag(field.tag)
                .map_err(|e| unsupported(format!("field {}: {e}", field.name)))?;
            if let Some(idx) = paths.iter().position(|p| is_prefix(p, &path) || is_prefix(&path, p)) {
                let other = fields[idx].name;
                return Err(unsupported(format!(
                    "fields {other} and {} have overlapping ids",
                    field.name
                )));
            }
            paths.push(path);
        }

        let mut heads: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, path) in paths.iter().enumerate() {
            heads.entry(path[0]).or_default().push(idx);
        }

        Ok(Self {
            type_name,
            fields,
            paths,
            heads,
        })
    }
}

impl<T> Shape<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldSpec<T>] {
        &self.fields
    }

    /// The id path of field `idx`.
    pub fn path(&self, idx: usize) -> &[u64] {
        &self.paths[idx]
    }

    /// Indices of the fields whose path begins with `id`.
    pub fn by_head(&self, id: u64) -> Option<&[usize]> {
        self.heads.get(&id).map(Vec::as_slice)
    }
}

impl<T> std::fmt::Debug for Shape<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}

fn is_prefix(short: &[u64], long: &[u64]) -> bool {
    short.len() <= long.len() && long[..short.len()] == *short
}

/// Parse `"1654AE6B>AE"` into `[0x1654AE6B, 0xAE]`.
fn parse_tag(tag: &str) -> std::result::Result<Vec<u64>, String> {
    tag.split('>')
        .map(|part| {
            let part = part.trim();
            let id = u64::from_str_radix(part, 16)
                .map_err(|e| format!("invalid id {part:?} in tag {tag:?}: {e}"))?;
            if crate::vint::id_width(id).is_none() {
                return Err(format!("0x{id:X} in tag {tag:?} is not a valid element id"));
            }
            Ok(id)
        })
        .collect()
}

lazy_static::lazy_static! {
    static ref SHAPES: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>> =
        RwLock::new(HashMap::new());
}

/// Get the cached [Shape] for `T`, building it on first use.
///
/// Lookups share a read lock. Building holds the upgradable lock, so only
/// one shape is constructed at a time and each only once.
pub fn shape_of<T: Schema>() -> Result<Arc<Shape<T>>> {
    let key = TypeId::of::<T>();
    if let Some(shape) = SHAPES.read().get(&key) {
        return downcast(shape.clone());
    }

    let guard = SHAPES.upgradable_read();
    if let Some(shape) = guard.get(&key) {
        return downcast(shape.clone());
    }
    let shape = Arc::new(Shape::<T>::build()?);
    tracing::debug!(
        "built EBML shape for {} with {} fields",
        shape.type_name,
        shape.fields.len()
    );
    let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
    guard.insert(key, shape.clone());
    Ok(shape)
}

fn downcast<T: Schema>(shape: Arc<dyn Any + Send + Sync>) -> Result<Arc<Shape<T>>> {
    shape.downcast::<Shape<T>>().map_err(|_| Error::UnsupportedShape {
        type_name: std::any::type_name::<T>(),
        reason: "cached shape has a different type".to_string(),
    })
}

/// Declare a struct together with its [Schema] implementation.
///
/// Each field is written `name: Type => kind("TAG")` where `kind` is one of
/// `scalar`, `nested`, `sequence` or `repeated` (see [FieldKind]) and `TAG`
/// is a hexadecimal id or a `>` separated id path. Append `, optional` inside
/// the parentheses to allow the field to be absent. `Default` is derived.
///
/// ```
/// ebml_decode::ebml_schema! {
///     #[derive(Debug)]
///     pub struct Seek {
///         pub id: Vec<u8> => scalar("53AB"),
///         pub position: u64 => scalar("53AC"),
///     }
/// }
///
/// ebml_decode::ebml_schema! {
///     #[derive(Debug)]
///     pub struct SeekHead {
///         pub seeks: Vec<Seek> => sequence("4DBB", optional),
///     }
/// }
/// ```
#[macro_export]
macro_rules! ebml_schema {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty => $kind:ident ( $tag:literal $(, $opt:ident)? )
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Default)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::Schema for $name {
            fn fields() -> ::std::vec::Vec<$crate::FieldSpec<Self>> {
                ::std::vec![
                    $(
                        $crate::FieldSpec::<Self>::$kind(
                            ::std::stringify!($field),
                            $tag,
                            |s| &mut s.$field,
                        ) $( .$opt() )?
                    ),*
                ]
            }
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    use test_log::test;

    crate::ebml_schema! {
        struct Inner {
            value: u64 => scalar("81"),
        }
    }

    crate::ebml_schema! {
        struct Outer {
            title: String => scalar("7BA9", optional),
            inner: Option<Inner> => nested("E0"),
            items: Vec<Inner> => sequence("1654AE6B>AE"),
            flags: Vec<u64> => repeated("1654AE6B>9C"),
        }
    }

    #[derive(Default)]
    struct BadHex {
        x: u64,
    }

    impl Schema for BadHex {
        fn fields() -> Vec<FieldSpec<Self>> {
            vec![FieldSpec::scalar("x", "zz", |s: &mut Self| &mut s.x)]
        }
    }

    #[derive(Default)]
    struct Overlapping {
        a: Vec<u64>,
        b: u64,
    }

    impl Schema for Overlapping {
        fn fields() -> Vec<FieldSpec<Self>> {
            vec![
                FieldSpec::repeated("a", "A0>81", |s: &mut Self| &mut s.a),
                FieldSpec::scalar("b", "A0", |s: &mut Self| &mut s.b),
            ]
        }
    }

    #[derive(Default)]
    struct BadMarker {
        x: u64,
    }

    impl Schema for BadMarker {
        fn fields() -> Vec<FieldSpec<Self>> {
            vec![FieldSpec::scalar("x", "0286", |s: &mut Self| &mut s.x)]
        }
    }

    #[test]
    fn shape_from_macro() -> Result<()> {
        let shape = shape_of::<Outer>()?;
        let names: Vec<_> = shape.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["title", "inner", "items", "flags"]);
        assert_eq!(shape.path(2), &[0x1654_AE6B, 0xAE]);
        assert_eq!(shape.by_head(0x1654_AE6B), Some(&[2usize, 3][..]));
        assert_eq!(shape.by_head(0x7BA9), Some(&[0usize][..]));
        assert_eq!(shape.by_head(0xAE), None);
        assert!(shape.fields()[0].is_optional());
        assert!(!shape.fields()[1].is_optional());
        assert_eq!(shape.fields()[3].kind(), FieldKind::Repeated);
        Ok(())
    }

    #[test]
    fn shape_is_cached() -> Result<()> {
        let a = shape_of::<Inner>()?;
        let b = shape_of::<Inner>()?;
        assert!(Arc::ptr_eq(&a, &b));
        Ok(())
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        crate::ebml_schema! {
            struct Raced {
                a: u64 => scalar("81"),
            }
        }
        let shapes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| shape_of::<Raced>().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for shape in &shapes[1..] {
            assert!(Arc::ptr_eq(&shapes[0], shape));
        }
    }

    #[test]
    fn invalid_schemas() {
        for err in [
            shape_of::<BadHex>().unwrap_err(),
            shape_of::<Overlapping>().unwrap_err(),
            shape_of::<BadMarker>().unwrap_err(),
        ] {
            assert!(matches!(err, Error::UnsupportedShape { .. }), "{err}");
        }
    }

    #[test]
    fn parse_tags() {
        assert_eq!(parse_tag("1A45DFA3").unwrap(), vec![0x1A45_DFA3]);
        assert_eq!(
            parse_tag("1254C367>7373").unwrap(),
            vec![0x1254_C367, 0x7373]
        );
        assert!(parse_tag("").is_err());
        assert!(parse_tag("AE>").is_err());
        assert!(parse_tag("0").is_err());
    }
}
