//! Appliance operations known to this client, per API version.

use crate::endpoint::{EndpointDescriptor, HttpMethod, VersionCandidate};
use crate::invoker::{OperationRegistry, RestBinding};

pub const API_PREFIX: &str = "/rest/vxm";

/// Suffix and descriptor of the job status query.
pub const REQUEST_STATUS: &str = "requests_get";
pub const REQUEST_STATUS_PATH: &str = "/requests/{id}";

pub struct CatalogEntry {
    pub suffix: &'static str,
    pub method: HttpMethod,
    /// Logical path, without prefix or version segment.
    pub path: &'static str,
    pub versions: &'static [u32],
}

impl CatalogEntry {
    pub fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor::new(self.path, Some(self.method))
    }
}

pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        suffix: "system_get",
        method: HttpMethod::Get,
        path: "/system",
        versions: &[1, 2, 3, 4],
    },
    CatalogEntry {
        suffix: "system_proxy_get",
        method: HttpMethod::Get,
        path: "/system/proxy",
        versions: &[1, 2, 3],
    },
    CatalogEntry {
        suffix: "system_proxy_patch",
        method: HttpMethod::Patch,
        path: "/system/proxy",
        versions: &[1, 2, 3],
    },
    CatalogEntry {
        suffix: "hosts_get",
        method: HttpMethod::Get,
        path: "/hosts",
        versions: &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
    },
    CatalogEntry {
        suffix: "host_get",
        method: HttpMethod::Get,
        path: "/hosts/{sn}",
        versions: &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
    },
    CatalogEntry {
        suffix: "cluster_get",
        method: HttpMethod::Get,
        path: "/cluster",
        versions: &[1, 2, 3],
    },
    CatalogEntry {
        suffix: "cluster_shutdown_post",
        method: HttpMethod::Post,
        path: "/cluster/shutdown",
        versions: &[1, 2],
    },
    CatalogEntry {
        suffix: "cluster_expansion_post",
        method: HttpMethod::Post,
        path: "/cluster/expansion",
        versions: &[1, 2, 3, 4, 5, 6, 7, 8],
    },
    CatalogEntry {
        suffix: "cluster_expansion_validate_post",
        method: HttpMethod::Post,
        path: "/cluster/expansion/validate",
        versions: &[1, 2, 3, 4, 5, 6, 7, 8],
    },
    CatalogEntry {
        suffix: "lcm_precheck_post",
        method: HttpMethod::Post,
        path: "/lcm/precheck",
        versions: &[1],
    },
    CatalogEntry {
        suffix: "lcm_upgrade_post",
        method: HttpMethod::Post,
        path: "/lcm/upgrade",
        versions: &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14],
    },
    CatalogEntry {
        suffix: "certificates_import_post",
        method: HttpMethod::Post,
        path: "/certificates/import-vxm",
        versions: &[1, 2, 3],
    },
    CatalogEntry {
        suffix: "certificates_csr_post",
        method: HttpMethod::Post,
        path: "/certificates/csr",
        versions: &[1],
    },
    CatalogEntry {
        suffix: REQUEST_STATUS,
        method: HttpMethod::Get,
        path: REQUEST_STATUS_PATH,
        versions: &[1],
    },
];

pub fn find(suffix: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.suffix == suffix)
}

/// Registry containing every catalog entry at every version it exists in.
pub fn default_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    for entry in CATALOG {
        for &n in entry.versions {
            let version = VersionCandidate::new(n);
            let path = format!("{}/{}{}", API_PREFIX, version, entry.path);
            registry.register(
                &version,
                entry.suffix,
                RestBinding {
                    method: entry.method,
                    path,
                },
            );
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_binds_versioned_paths() {
        let registry = default_registry();
        let binding = registry.lookup("v2_cluster_shutdown_post").unwrap();
        assert_eq!(binding.method, HttpMethod::Post);
        assert_eq!(binding.path, "/rest/vxm/v2/cluster/shutdown");
        assert!(registry.lookup("v3_cluster_shutdown_post").is_none());
        assert_eq!(
            registry.lookup("v1_requests_get").unwrap().path,
            "/rest/vxm/v1/requests/{id}"
        );
    }

    #[test]
    fn suffixes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        assert!(CATALOG.iter().all(|e| seen.insert(e.suffix)));
    }
}
