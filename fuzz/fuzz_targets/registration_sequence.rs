#![no_main]

use ferrous_services::{
    Capabilities, Component, Container, DiError, DiResult, Inject, InjectionPoints, Lifetime,
    Resolver,
};
use libfuzzer_sys::fuzz_target;

trait North: Send + Sync {}
trait East: Send + Sync {}
trait South: Send + Sync {}

#[derive(Default)]
struct NorthImpl {
    east: Inject<dyn East>,
}
impl North for NorthImpl {}
impl Component for NorthImpl {
    fn construct() -> Self {
        Self::default()
    }
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.provide::<dyn North>(|this| this);
    }
    fn injection_points(points: &mut InjectionPoints<Self>) {
        points.mark::<dyn East>("east").assign_with(|this| &this.east);
    }
}

#[derive(Default)]
struct EastImpl {
    south: Inject<dyn South>,
}
impl East for EastImpl {}
impl Component for EastImpl {
    fn construct() -> Self {
        Self::default()
    }
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.provide::<dyn East>(|this| this);
    }
    fn injection_points(points: &mut InjectionPoints<Self>) {
        points.mark::<dyn South>("south").assign_with(|this| &this.south);
    }
}

struct SouthLeaf;
impl South for SouthLeaf {}
impl Component for SouthLeaf {
    fn construct() -> Self {
        SouthLeaf
    }
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.provide::<dyn South>(|this| this);
    }
}

// Closes the loop North -> East -> South -> North
#[derive(Default)]
struct SouthLoop {
    north: Inject<dyn North>,
}
impl South for SouthLoop {}
impl Component for SouthLoop {
    fn construct() -> Self {
        Self::default()
    }
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.provide::<dyn South>(|this| this);
    }
    fn injection_points(points: &mut InjectionPoints<Self>) {
        points.mark::<dyn North>("north").assign_with(|this| &this.north);
    }
}

fn register(container: &mut Container, op: u8, lifetime: Lifetime) -> DiResult<()> {
    match op % 4 {
        0 => container.register::<dyn North, NorthImpl>(lifetime),
        1 => container.register::<dyn East, EastImpl>(lifetime),
        2 => container.register::<dyn South, SouthLeaf>(lifetime),
        _ => container.register::<dyn South, SouthLoop>(lifetime),
    }
}

fn resolve(container: &Container, op: u8) -> DiResult<()> {
    match op % 3 {
        0 => container.resolve::<dyn North>().map(|_| ()),
        1 => container.resolve::<dyn East>().map(|_| ()),
        _ => container.resolve::<dyn South>().map(|_| ()),
    }
}

fuzz_target!(|data: &[u8]| {
    let mut container = Container::new();

    for byte in data {
        let lifetime = if byte & 0x80 == 0 {
            Lifetime::Transient
        } else {
            Lifetime::Singleton
        };
        match (byte >> 4) & 0x3 {
            0 => {
                let before = container.registry().len();
                match register(&mut container, byte & 0x0f, lifetime) {
                    Ok(()) => assert_eq!(container.registry().len(), before + 1),
                    Err(_) => assert_eq!(container.registry().len(), before),
                }
            }
            1 => match resolve(&container, byte & 0x0f) {
                Ok(()) | Err(DiError::NotFound(_)) => {}
                Err(other) => panic!("unexpected resolve error: {other}"),
            },
            2 => {
                let _ = container.prewarm();
            }
            _ => container.clear(),
        }
    }
});
