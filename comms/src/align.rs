// Receive buffers are made of these so that `f64` payloads can be cast in place.
pub trait Align8: bytemuck::Pod {}

impl Align8 for u64 {}
impl Align8 for i64 {}
impl Align8 for u128 {}
impl Align8 for i128 {}
impl Align8 for f64 {}
