use crate::shared::spawn::BlockingSpawn;
pub use tokio::runtime::Handle;
pub use tokio::task::spawn;

pub fn spawn_blocking<F, R>(f: F) -> BlockingSpawn<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    BlockingSpawn {
        handle: tokio::task::spawn_blocking(f),
    }
}

/// Returns the handle of the runtime driving the current thread, if any
pub fn current_handle() -> Option<Handle> {
    Handle::try_current().ok()
}

#[cfg(test)]
mod tests {
    use super::{current_handle, spawn_blocking};

    #[tokio::test]
    async fn blocking_closure_returns_value() {
        let value = spawn_blocking(|| 40 + 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn blocking_panic_surfaces_as_error() {
        let res = spawn_blocking(|| -> usize { panic!("boom") }).await;
        assert!(res.is_err());
        assert!(res.unwrap_err().to_string().contains("Blocking task failed"));
    }

    #[test]
    fn no_handle_outside_runtime() {
        assert!(current_handle().is_none());
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async { assert!(current_handle().is_some()) });
    }
}
