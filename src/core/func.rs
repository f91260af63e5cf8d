//! Purpose: Bind one exported GEOS function by name and resolve it on first use.
//! Exports: `CType`, `Signature`, `NativeFn`, `ResultCheck`, `Binding`, `LazyFunc`.
//! Role: Deferred-resolution wrapper between callers and the lazily loaded library.
//! Invariants: Construction never touches the library; resolution happens at most once.
//! Invariants: A failed resolution is cached and only affects its own binding.
//! Invariants: Return values are judged only by the configured `ResultCheck`.
use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::error::{Error, ErrorKind};
use crate::core::loader::SymbolResolver;
use crate::core::sys::{
    ContextPtr, CoordSeqPtr, GEOSContextHandle_t, GEOSCoordSeq_t, GEOSGeom_t, GEOSPrepGeom_t,
    GeomPtr, MessageHandler, PrepGeomPtr, RawSymbol,
};

/// C-level type of an argument or return slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CType {
    Void,
    Char,
    UChar,
    Int,
    UInt,
    SizeT,
    Double,
    CString,
    Geom,
    PrepGeom,
    CoordSeq,
    Context,
    Handler,
    Pointer,
    OutInt,
    OutUInt,
    OutDouble,
    OutSizeT,
}

pub trait CTypeOf {
    const CTYPE: CType;
}

macro_rules! ctype_of {
    ($($ty:ty => $ctype:ident,)*) => {
        $(impl CTypeOf for $ty {
            const CTYPE: CType = CType::$ctype;
        })*
    };
}

// Concrete integer types: `c_char` is `i8` or `u8` depending on the target.
ctype_of! {
    () => Void,
    i8 => Char,
    u8 => UChar,
    i32 => Int,
    u32 => UInt,
    usize => SizeT,
    f64 => Double,
    *const i8 => CString,
    *const u8 => CString,
    *mut i8 => CString,
    *mut u8 => CString,
    GeomPtr => Geom,
    *const GEOSGeom_t => Geom,
    PrepGeomPtr => PrepGeom,
    *const GEOSPrepGeom_t => PrepGeom,
    CoordSeqPtr => CoordSeq,
    *const GEOSCoordSeq_t => CoordSeq,
    ContextPtr => Context,
    *const GEOSContextHandle_t => Context,
    MessageHandler => Handler,
    *mut c_void => Pointer,
    *const c_void => Pointer,
    *mut i32 => OutInt,
    *mut u32 => OutUInt,
    *mut f64 => OutDouble,
    *mut usize => OutSizeT,
}

/// Declared argument and return types of a binding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    pub args: Vec<CType>,
    pub ret: CType,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, arg) in self.args.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg:?}")?;
        }
        write!(f, ") -> {:?}", self.ret)
    }
}

/// An `unsafe extern "C" fn` pointer type that can be built from a symbol
/// address and called with a tuple of arguments.
pub trait NativeFn: Copy + Send + Sync + 'static {
    type Args;
    type Output;

    fn signature() -> Signature;

    /// # Safety
    /// `symbol` must be the address of a function with exactly this signature.
    unsafe fn from_symbol(symbol: RawSymbol) -> Self;

    /// # Safety
    /// Same contract as calling the native function directly.
    unsafe fn invoke(self, args: Self::Args) -> Self::Output;
}

macro_rules! native_fn {
    ($($arg:ident),*) => {
        impl<R: CTypeOf + 'static, $($arg: CTypeOf + 'static),*> NativeFn
            for unsafe extern "C" fn($($arg),*) -> R
        {
            type Args = ($($arg,)*);
            type Output = R;

            fn signature() -> Signature {
                Signature {
                    args: vec![$($arg::CTYPE),*],
                    ret: R::CTYPE,
                }
            }

            unsafe fn from_symbol(symbol: RawSymbol) -> Self {
                unsafe { std::mem::transmute_copy::<RawSymbol, Self>(&symbol) }
            }

            #[allow(non_snake_case)]
            unsafe fn invoke(self, args: Self::Args) -> R {
                let ($($arg,)*) = args;
                unsafe { (self)($($arg),*) }
            }
        }
    };
}

native_fn!();
native_fn!(A);
native_fn!(A, B);
native_fn!(A, B, C);
native_fn!(A, B, C, D);
native_fn!(A, B, C, D, E);
native_fn!(A, B, C, D, E, F);

/// Inspects a raw return value; may reject it or rewrite it.
pub type ResultCheck<R> = fn(R, &str) -> Result<R, Error>;

/// Resolve state of a `LazyFunc`.
pub enum Binding<F> {
    Unresolved,
    Resolved(F),
    Failed(Error),
}

impl<F> Binding<F> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Binding::Resolved(_))
    }
}

impl<F> fmt::Debug for Binding<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Unresolved => f.write_str("Unresolved"),
            Binding::Resolved(_) => f.write_str("Resolved"),
            Binding::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

pub struct LazyFunc<F: NativeFn> {
    name: String,
    resolver: Arc<dyn SymbolResolver>,
    check: Option<ResultCheck<F::Output>>,
    state: Mutex<Binding<F>>,
}

impl<F: NativeFn> LazyFunc<F> {
    pub fn new(name: impl Into<String>, resolver: Arc<dyn SymbolResolver>) -> Self {
        Self {
            name: name.into(),
            resolver,
            check: None,
            state: Mutex::new(Binding::Unresolved),
        }
    }

    pub fn with_check(mut self, check: ResultCheck<F::Output>) -> Self {
        self.check = Some(check);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Signature {
        F::signature()
    }

    pub fn has_check(&self) -> bool {
        self.check.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.lock_state().is_resolved()
    }

    // Every write leaves `Binding` whole, so a poisoned lock is still usable.
    fn lock_state(&self) -> MutexGuard<'_, Binding<F>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the native function, resolving it on the first call.
    pub fn resolve(&self) -> Result<F, Error> {
        let mut state = self.lock_state();

        match &*state {
            Binding::Resolved(func) => return Ok(*func),
            Binding::Failed(err) => return Err(err.clone()),
            Binding::Unresolved => {}
        }

        match self.resolver.resolve(&self.name) {
            Ok(symbol) => {
                // The declared type is the caller's promise about this symbol.
                let func = unsafe { F::from_symbol(symbol) };
                tracing::debug!(
                    symbol = %self.name,
                    signature = %F::signature(),
                    "resolved GEOS function"
                );
                *state = Binding::Resolved(func);
                Ok(func)
            }
            Err(err) => {
                // Load failures belong to the library, not to this binding.
                let err = if err.kind() == ErrorKind::Symbol && err.symbol().is_none() {
                    err.with_symbol(&self.name)
                } else {
                    err
                };
                *state = Binding::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Resolves if needed, calls the native function, and runs the result check.
    ///
    /// # Safety
    /// Arguments must satisfy the native function's contract (valid pointers,
    /// matching context handle, and so on).
    pub unsafe fn call(&self, args: F::Args) -> Result<F::Output, Error> {
        let func = self.resolve()?;
        let ret = unsafe { func.invoke(args) };
        match self.check {
            Some(check) => check(ret, &self.name),
            None => Ok(ret),
        }
    }
}

impl<F: NativeFn> fmt::Debug for LazyFunc<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFunc")
            .field("name", &self.name)
            .field("signature", &F::signature())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Binding, CType, LazyFunc, NativeFn, Signature};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::loader::SymbolResolver;
    use crate::core::loader::testing::symbol_of;
    use crate::core::sys::{GeomPtr, RawSymbol, VersionFn};
    use libc::{c_char, c_int};
    use std::collections::HashMap;
    use std::ffi::CStr;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    type AddFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
    type AreaFn = unsafe extern "C" fn(GeomPtr, *mut f64) -> c_int;

    unsafe extern "C" fn fake_add(a: c_int, b: c_int) -> c_int {
        a + b
    }

    unsafe extern "C" fn fake_version() -> *const c_char {
        c"3.9.1-CAPI-1.14.2".as_ptr()
    }

    /// Symbol table with a lookup counter.
    #[derive(Default)]
    struct CountingResolver {
        symbols: HashMap<String, usize>,
        lookups: AtomicUsize,
    }

    impl CountingResolver {
        fn with(mut self, name: &str, address: usize) -> Self {
            self.symbols.insert(name.to_string(), address);
            self
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    impl SymbolResolver for CountingResolver {
        fn resolve(&self, name: &str) -> Result<RawSymbol, Error> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.symbols
                .get(name)
                .map(|address| symbol_of(*address))
                .ok_or_else(|| Error::new(ErrorKind::Symbol).with_message("symbol not found"))
        }
    }

    fn adder() -> Arc<CountingResolver> {
        Arc::new(CountingResolver::default().with("add", fake_add as AddFn as usize))
    }

    struct UnloadableResolver;

    impl SymbolResolver for UnloadableResolver {
        fn resolve(&self, _name: &str) -> Result<RawSymbol, Error> {
            Err(Error::new(ErrorKind::Config).with_message("could not find the GEOS library"))
        }
    }

    fn reject_negative(value: c_int, name: &str) -> Result<c_int, Error> {
        if value < 0 {
            return Err(Error::new(ErrorKind::Geos)
                .with_message("negative result")
                .with_symbol(name));
        }
        Ok(value)
    }

    #[test]
    fn signature_follows_the_pointer_type() {
        assert_eq!(
            <AreaFn as NativeFn>::signature(),
            Signature {
                args: vec![CType::Geom, CType::OutDouble],
                ret: CType::Int,
            }
        );
        assert_eq!(
            <VersionFn as NativeFn>::signature().to_string(),
            "() -> CString"
        );
    }

    #[test]
    fn missing_symbol_fails_on_first_call_only() {
        let resolver = Arc::new(CountingResolver::default());
        let func: LazyFunc<AddFn> = LazyFunc::new("GEOSNoSuchThing_r", resolver.clone());
        assert_eq!(resolver.lookups(), 0);
        assert!(!func.is_resolved());

        let err = unsafe { func.call((1, 2)) }.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Symbol);
        assert_eq!(err.symbol(), Some("GEOSNoSuchThing_r"));

        let again = unsafe { func.call((1, 2)) }.expect_err("still missing");
        assert_eq!(again.kind(), ErrorKind::Symbol);
        assert_eq!(resolver.lookups(), 1);
    }

    #[test]
    fn failed_binding_leaves_others_usable() {
        let resolver = adder();
        let missing: LazyFunc<AddFn> = LazyFunc::new("missing", resolver.clone());
        let add: LazyFunc<AddFn> = LazyFunc::new("add", resolver.clone());

        assert!(missing.resolve().is_err());
        assert_eq!(unsafe { add.call((2, 3)) }.expect("add"), 5);
    }

    #[test]
    fn library_errors_are_not_tagged_with_the_binding() {
        let func: LazyFunc<VersionFn> =
            LazyFunc::new("GEOSversion", Arc::new(UnloadableResolver));
        let err = unsafe { func.call(()) }.expect_err("no library");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.symbol(), None);
        assert!(!err.to_string().contains("GEOSversion"));
    }

    #[test]
    fn poisoned_binding_keeps_working() {
        let resolver = adder();
        let add: LazyFunc<AddFn> = LazyFunc::new("add", resolver.clone());
        assert_eq!(unsafe { add.call((1, 1)) }.expect("add"), 2);

        let poisoned = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = add.state.lock().expect("lock");
            if add.name() == "add" {
                panic!("binding lock held across a panic");
            }
        }));
        assert!(poisoned.is_err());
        assert!(add.state.is_poisoned());

        assert!(add.is_resolved());
        assert_eq!(unsafe { add.call((2, 3)) }.expect("add"), 5);
        assert_eq!(resolver.lookups(), 1);
    }

    #[test]
    fn resolved_function_is_reused() {
        let resolver = adder();
        let add: LazyFunc<AddFn> = LazyFunc::new("add", resolver.clone());

        for i in 0..10 {
            assert_eq!(unsafe { add.call((i, 1)) }.expect("add"), i + 1);
        }
        assert!(add.is_resolved());
        assert_eq!(resolver.lookups(), 1);
    }

    #[test]
    fn concurrent_first_calls_resolve_once() {
        let resolver = adder();
        let add: Arc<LazyFunc<AddFn>> = Arc::new(LazyFunc::new("add", resolver.clone()));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        std::thread::scope(|scope| {
            for i in 0..threads {
                let add = Arc::clone(&add);
                let barrier = Arc::clone(&barrier);
                scope.spawn(move || {
                    barrier.wait();
                    let value = unsafe { add.call((i as c_int, 0)) }.expect("add");
                    assert_eq!(value, i as c_int);
                });
            }
        });

        assert_eq!(resolver.lookups(), 1);
    }

    #[test]
    fn result_check_can_reject() {
        let resolver = adder();
        let add: LazyFunc<AddFn> =
            LazyFunc::new("add", resolver.clone()).with_check(reject_negative);
        assert!(add.has_check());

        assert_eq!(unsafe { add.call((1, 1)) }.expect("ok"), 2);
        let err = unsafe { add.call((1, -5)) }.expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::Geos);
        assert_eq!(err.symbol(), Some("add"));
        assert!(add.is_resolved());
    }

    #[test]
    fn zero_argument_functions_resolve() {
        let resolver = Arc::new(
            CountingResolver::default().with("GEOSversion", fake_version as VersionFn as usize),
        );
        let version: LazyFunc<VersionFn> = LazyFunc::new("GEOSversion", resolver);
        let raw = unsafe { version.call(()) }.expect("version");
        let text = unsafe { CStr::from_ptr(raw) }.to_str().expect("utf8");
        assert_eq!(text, "3.9.1-CAPI-1.14.2");
    }

    #[test]
    fn binding_debug_hides_function_pointer() {
        let unresolved: Binding<AddFn> = Binding::Unresolved;
        assert_eq!(format!("{unresolved:?}"), "Unresolved");
        let failed: Binding<AddFn> = Binding::Failed(Error::new(ErrorKind::Symbol));
        assert!(format!("{failed:?}").starts_with("Failed("));
    }
}
