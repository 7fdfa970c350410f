use std::sync::Arc;

use crate::memcg::Memcg;

/// root -> a(1) -> b(2) -> c(3), plus root -> d(4).
pub struct Tree {
    pub root: Arc<Memcg>,
    pub a: Arc<Memcg>,
    pub b: Arc<Memcg>,
    pub c: Arc<Memcg>,
    pub d: Arc<Memcg>,
}

pub fn tree() -> Tree {
    let root = Memcg::root();
    let a = Memcg::new_child(&root, 1);
    let b = Memcg::new_child(&a, 2);
    let c = Memcg::new_child(&b, 3);
    let d = Memcg::new_child(&root, 4);
    Tree { root, a, b, c, d }
}
