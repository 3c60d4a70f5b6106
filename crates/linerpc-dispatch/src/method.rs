//! Invokable methods built from plain Rust closures.
//!
//! A [`Method`] pairs a name with a type-erased invoker and the
//! descriptors of its parameters and return type. The descriptors come
//! from the closure's own signature through the [`Handler`] trait, so a
//! method is declared once:
//!
//! ```rust
//! use linerpc_dispatch::{Method, TypeDescriptor};
//!
//! let add = Method::new("add", |a: i64, b: i64| a + b);
//! assert_eq!(add.params(), &[TypeDescriptor::Integer, TypeDescriptor::Integer]);
//! assert_eq!(add.signature(), "add(integer,integer)");
//! ```

use std::fmt;
use std::sync::Arc;

use linerpc_protocol::Value;

use crate::{FromValue, IntoValue, MarshalError, Marshaler, TypeDescriptor, Typed};

/// A closure usable as an RPC method.
///
/// Implemented for `Fn` closures of zero to six arguments whose argument
/// types implement [`FromValue`] + [`Typed`] and whose return type
/// implements [`IntoValue`] + [`Typed`]. `Args` is the argument tuple and
/// only serves to keep the implementations apart.
pub trait Handler<Args>: Send + Sync + 'static {
    fn params() -> Vec<TypeDescriptor>;

    fn returns() -> TypeDescriptor;

    /// Marshals `args`, runs the closure and returns its raw result.
    fn call(&self, args: Vec<Value>, marshaler: &Marshaler) -> Result<Value, MarshalError>;
}

macro_rules! impl_handler {
    ($($ty:ident $var:ident),*) => {
        impl<F, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
            R: IntoValue + Typed,
            $($ty: FromValue + Typed,)*
        {
            fn params() -> Vec<TypeDescriptor> {
                vec![$($ty::descriptor()),*]
            }

            fn returns() -> TypeDescriptor {
                R::descriptor()
            }

            #[allow(unused_mut, unused_variables)]
            fn call(&self, args: Vec<Value>, marshaler: &Marshaler) -> Result<Value, MarshalError> {
                let expected = <Self as Handler<($($ty,)*)>>::params().len();
                if args.len() != expected {
                    return Err(MarshalError::Arity {
                        expected,
                        found: args.len(),
                    });
                }
                let mut args = args.into_iter();
                $(
                    let $var: $ty = marshaler
                        .to_native(&$ty::descriptor(), args.next().unwrap_or_default())?;
                )*
                Ok((self)($($var),*).into_value())
            }
        }
    };
}

impl_handler!();
impl_handler!(A a);
impl_handler!(A a, B b);
impl_handler!(A a, B b, C c);
impl_handler!(A a, B b, C c, D d);
impl_handler!(A a, B b, C c, D d, E e);
impl_handler!(A a, B b, C c, D d, E e, G g);

type Invoker = dyn Fn(Vec<Value>, &Marshaler) -> Result<Value, MarshalError> + Send + Sync;

/// A named, invokable member of an object.
///
/// Cheap to clone: the closure is shared.
#[derive(Clone)]
pub struct Method {
    name: String,
    params: Vec<TypeDescriptor>,
    returns: TypeDescriptor,
    invoker: Arc<Invoker>,
}

impl Method {
    /// Wraps a closure. Descriptors are derived here, once.
    pub fn new<Args: 'static, H: Handler<Args>>(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            params: H::params(),
            returns: H::returns(),
            invoker: erase(handler),
        }
    }

    /// Builds a method from explicit descriptors and a closure over raw
    /// values. Arguments reach the closure already checked against
    /// `params` and normalized by the marshaler.
    pub fn dynamic<F>(
        name: impl Into<String>,
        params: Vec<TypeDescriptor>,
        returns: TypeDescriptor,
        f: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
    {
        let invoker = erase_dynamic(params.clone(), f);
        Self {
            name: name.into(),
            params,
            returns,
            invoker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    pub fn returns(&self) -> &TypeDescriptor {
        &self.returns
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `name(p1,p2)` in normalized descriptor form.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// Runs the method. The result is the raw native value; the caller
    /// marshals it against [`returns`](Self::returns).
    pub fn invoke(&self, args: Vec<Value>, marshaler: &Marshaler) -> Result<Value, MarshalError> {
        (self.invoker)(args, marshaler)
    }
}

fn erase<Args: 'static, H: Handler<Args>>(handler: H) -> Arc<Invoker> {
    Arc::new(move |args: Vec<Value>, marshaler: &Marshaler| handler.call(args, marshaler))
}

fn erase_dynamic<F>(descriptors: Vec<TypeDescriptor>, f: F) -> Arc<Invoker>
where
    F: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
{
    Arc::new(move |args: Vec<Value>, marshaler: &Marshaler| {
        if args.len() != descriptors.len() {
            return Err(MarshalError::Arity {
                expected: descriptors.len(),
                found: args.len(),
            });
        }
        let args = descriptors
            .iter()
            .zip(args)
            .map(|(desc, arg)| marshaler.to_native::<Value>(desc, arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(f(args))
    })
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("signature", &self.signature())
            .field("returns", &self.returns)
            .finish()
    }
}
