//! Type-erased service objects.

use std::any::Any;
use std::sync::Arc;

/// A service instance as seen by the admin.
///
/// Services and proxies are shared, never owned: the admin holds an `Arc` so
/// an exported service cannot disappear while a call is being dispatched.
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete service into a [`ServiceObject`].
pub fn service_object<T: Any + Send + Sync>(service: T) -> ServiceObject {
    Arc::new(service)
}

/// Recover the concrete type of a service object.
pub fn downcast_service<T: Any + Send + Sync>(object: &ServiceObject) -> Option<Arc<T>> {
    Arc::clone(object).downcast::<T>().ok()
}
