//! IP-pool contract (§1, §4.F Create): only `allocate` is consumed from the
//! external service per the spec's Non-goals. `release` is added here —
//! `examples/original_source/tarantool.py::create` allocates two IPs with
//! no visible release path, which would otherwise leak addresses on every
//! Create+Delete cycle and break the round-trip law in §8.

use std::net::Ipv4Addr;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum IpPoolError {
    #[error("ip pool exhausted")]
    Exhausted,
    #[error("address not owned by this pool: {0}")]
    NotOwned(Ipv4Addr),
}

type BoxFut<'a, T> = Pin<Box<dyn std::future::Future<Output = Result<T, IpPoolError>> + Send + 'a>>;

pub trait IpPool: Send + Sync {
    fn allocate(&self) -> BoxFut<'_, Ipv4Addr>;
    fn release(&self, addr: Ipv4Addr) -> BoxFut<'_, ()>;
}

/// In-memory pool backed by a free list, used in tests and as a reference
/// implementation until a production IP-pool service is wired in.
pub struct StaticIpPool {
    free: std::sync::Mutex<Vec<Ipv4Addr>>,
}

impl StaticIpPool {
    pub fn new(addresses: Vec<Ipv4Addr>) -> Self {
        Self {
            free: std::sync::Mutex::new(addresses),
        }
    }
}

impl IpPool for StaticIpPool {
    fn allocate(&self) -> BoxFut<'_, Ipv4Addr> {
        Box::pin(async move {
            let mut free = self.free.lock().unwrap();
            free.pop().ok_or(IpPoolError::Exhausted)
        })
    }

    fn release(&self, addr: Ipv4Addr) -> BoxFut<'_, ()> {
        Box::pin(async move {
            self.free.lock().unwrap().push(addr);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_then_release_makes_address_reusable() {
        let pool = StaticIpPool::new(vec!["10.0.0.5".parse().unwrap()]);
        let addr = pool.allocate().await.unwrap();
        assert!(pool.allocate().await.is_err());
        pool.release(addr).await.unwrap();
        assert_eq!(pool.allocate().await.unwrap(), addr);
    }
}
