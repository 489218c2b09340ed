//! BGP neighbor derivation
//!
//! On point-to-point subnets the far end is implied by our own address;
//! anything wider needs an explicit neighbor from the caller.

use ipnetwork::Ipv4Network;
use netforge_common::{Error, Result};
use std::net::Ipv4Addr;

/// Derive the neighbor address from a local interface address.
///
/// `/31`: the other host of the pair. `/30`: the other usable host.
/// Anything else fails; the caller must supply the neighbor explicitly.
pub fn derive_neighbor(local: Ipv4Network) -> Result<Ipv4Addr> {
    let addr = u32::from(local.ip());
    match local.prefix() {
        31 => Ok(Ipv4Addr::from(addr ^ 1)),
        30 => {
            let base = u32::from(local.network());
            let (first, second) = (base + 1, base + 2);
            if addr == first {
                Ok(Ipv4Addr::from(second))
            } else if addr == second {
                Ok(Ipv4Addr::from(first))
            } else {
                Err(Error::validation(format!(
                    "{} is the network or broadcast address of its /30",
                    local.ip()
                )))
            }
        }
        prefix => Err(Error::validation(format!(
            "cannot derive a neighbor from /{}; supply one explicitly",
            prefix
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash31_pairs() {
        let neighbor = derive_neighbor("10.0.0.0/31".parse().unwrap()).unwrap();
        assert_eq!(neighbor, Ipv4Addr::new(10, 0, 0, 1));
        let neighbor = derive_neighbor("10.0.0.1/31".parse().unwrap()).unwrap();
        assert_eq!(neighbor, Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn slash30_takes_the_other_host() {
        let neighbor = derive_neighbor("10.0.0.1/30".parse().unwrap()).unwrap();
        assert_eq!(neighbor, Ipv4Addr::new(10, 0, 0, 2));
        let neighbor = derive_neighbor("10.0.0.2/30".parse().unwrap()).unwrap();
        assert_eq!(neighbor, Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn slash30_network_address_is_rejected() {
        assert!(derive_neighbor("10.0.0.0/30".parse().unwrap()).is_err());
        assert!(derive_neighbor("10.0.0.3/30".parse().unwrap()).is_err());
    }

    #[test]
    fn wider_prefixes_need_an_explicit_neighbor() {
        assert!(derive_neighbor("10.0.0.1/29".parse().unwrap()).is_err());
        assert!(derive_neighbor("10.1.1.1/24".parse().unwrap()).is_err());
    }
}
