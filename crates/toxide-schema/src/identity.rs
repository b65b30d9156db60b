use crate::resolve::EnvConfig;
use crate::types::Fingerprint;

/// Compute the install fingerprint of an environment.
///
/// Covers everything that shapes the installed context: interpreter, site
/// packages, install command and the ordered dependency list. Commands, setenv and
/// other run-time attributes are not part of it: editing them keeps the existing
/// context.
pub fn compute_fingerprint(env: &EnvConfig) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();

    hasher.update(format!("basepython:{}", env.basepython.as_deref().unwrap_or("")).as_bytes());
    if env.sitepackages {
        hasher.update(b"sitepackages");
    }
    hasher.update(format!("install:{}", env.install_command).as_bytes());
    for (idx, dep) in env.deps.iter().enumerate() {
        hasher.update(format!("dep:{idx}:{dep}").as_bytes());
    }

    Fingerprint::new(hasher.finalize().to_hex().to_string())
}
