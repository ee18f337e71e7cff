//! Tensor lifecycle across scopes, contexts and backend selection.

use mlpipe_runtime::{
    BackendSelector, CpuBackend, RuntimeContext, RuntimeError, TensorScope, backend,
};
use pretty_assertions::assert_eq;

fn ctx() -> RuntimeContext {
    RuntimeContext::with_backend(Box::new(CpuBackend::new())).unwrap()
}

fn failing_chain(scope: &mut TensorScope<'_>) -> mlpipe_runtime::Result<()> {
    let a = scope.from_f32(vec![1.0; 6], &[2, 3])?;
    let b = scope.from_f32(vec![1.0; 6], &[2, 3])?;
    // [2, 3] @ [2, 3] is not a valid product.
    scope.matmul(&a, &b)?;
    Ok(())
}

#[test]
fn test_error_path_releases_everything() {
    let mut ctx = ctx();
    {
        let mut scope = ctx.scope();
        assert!(failing_chain(&mut scope).is_err());
    }
    let stats = ctx.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.allocated, stats.released);
}

#[test]
fn test_panic_unwinding_releases_tracked() {
    let mut ctx = ctx();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut scope = ctx.scope();
        scope.from_f32(vec![0.0; 4], &[4]).unwrap();
        panic!("boom");
    }));
    assert!(result.is_err());
    assert_eq!(ctx.stats().live, 0);
}

#[test]
fn test_kept_tensor_outlives_scope_until_released() {
    let mut ctx = ctx();
    let kept = {
        let mut scope = ctx.scope();
        let t = scope.from_f32(vec![1.0, 2.0], &[2]).unwrap();
        let doubled = scope.scale(&t, 2.0).unwrap();
        scope.keep(doubled)
    };
    assert!(ctx.is_live(&kept));
    assert_eq!(ctx.stats().live, 1);

    ctx.release(kept.clone()).unwrap();
    assert!(matches!(
        ctx.release(kept),
        Err(RuntimeError::DoubleRelease(_))
    ));
}

#[test]
fn test_selector_skips_failing_candidate() {
    let mut ctx = RuntimeContext::new();
    let active = BackendSelector::from_names(&["missing", "cpu"])
        .initialize(&mut ctx)
        .unwrap();

    assert_eq!(active.name, "cpu");
    assert_eq!(ctx.active_backend(), Some("cpu"));
    assert_eq!(active.skipped[0].0, "missing");
}

#[test]
fn test_selector_on_initialized_context_is_noop() {
    let mut ctx = ctx();
    let active = BackendSelector::from_names(&backend::available())
        .initialize(&mut ctx)
        .unwrap();
    assert_eq!(active.name, "cpu");
    assert!(active.skipped.is_empty());
}

#[test]
fn test_operations_need_a_backend() {
    let mut ctx = RuntimeContext::new();
    let mut scope = ctx.scope();
    assert!(matches!(
        scope.from_f32(vec![1.0], &[1]),
        Err(RuntimeError::NotInitialized)
    ));
}
