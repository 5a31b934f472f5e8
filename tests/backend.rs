#![cfg(not(feature = "wgpu"))]

use gridnet::backend::{Backend, get_backend, set_backend};
use gridnet::matrix;

#[test]
fn test_wgpu_selection_falls_back_to_cpu() {
    let _ = env_logger::builder().is_test(true).try_init();
    set_backend(Backend::Wgpu);
    assert_eq!(get_backend(), Backend::Wgpu);

    let a = matrix![[1, 2], [3, 4]];
    assert_eq!(&a + &a, matrix![[2, 4], [6, 8]]);
    assert_eq!(&a * &a, matrix![[7, 10], [15, 22]]);

    set_backend(Backend::Cpu);
    assert_eq!(get_backend(), Backend::Cpu);
}
