use libc::{c_int, rlim_t, rlimit};
use log::debug;
use warden_ipc::errno;

#[cfg(target_env = "gnu")]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(target_env = "gnu"))]
type Resource = c_int;

// Both the soft and the hard limit end up at min(current, requested): this
// can only ever tighten what the process is allowed.
fn lower_limit(resource: Resource, name: &str, requested: rlim_t) -> Result<(), c_int> {
    let mut current = rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(resource, &mut current as *mut rlimit) } != 0 {
        return Err(errno());
    }
    let new = rlimit {
        rlim_cur: rlim_t::min(current.rlim_cur, requested),
        rlim_max: rlim_t::min(current.rlim_max, requested),
    };
    if unsafe { libc::setrlimit(resource, &new as *const rlimit) } != 0 {
        return Err(errno());
    }
    debug!(
        "{} limit lowered to {}/{} (requested {})",
        name, new.rlim_cur, new.rlim_max, requested
    );
    Ok(())
}

pub(crate) fn limit_address_space(
    address_space: Option<rlim_t>,
    data_segment: Option<rlim_t>,
) -> Result<(), c_int> {
    if let Some(limit) = address_space {
        lower_limit(libc::RLIMIT_AS, "RLIMIT_AS", limit)?;
    }
    if let Some(limit) = data_segment {
        lower_limit(libc::RLIMIT_DATA, "RLIMIT_DATA", limit)?;
    }
    Ok(())
}
