//! Reconfigure / `update_config` (§4.F): deploy a gzipped tar archive (or a
//! single `.lua` file) to `/opt/deploy/<UTC-ISO>` on each existing
//! container and re-point the `/opt/tarantool` symlink at it.
//!
//! §4.F / §9: the faulty file-type validation in
//! `examples/original_source/tarantool.py` (a format-string/`join` misuse
//! that raises instead of reporting the intended message) is replaced with
//! the validation below, run before any side effect.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::LifecycleError;
use crate::model::{GroupId, OPT_TARANTOOL};
use crate::projection;
use crate::task::{TaskKind, TaskLog};

use super::GroupContext;

const ACCEPTED_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".lua"];

pub fn validate_filename(filename: &str) -> Result<(), LifecycleError> {
    if ACCEPTED_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
        Ok(())
    } else {
        Err(LifecycleError::Validation(format!(
            "'{filename}' is not a supported configuration bundle type (expected one of {ACCEPTED_EXTENSIONS:?})"
        )))
    }
}

/// Normalizes the caller's upload into plain tar bytes: `.tar.gz`/`.tgz`
/// are gunzipped, `.lua` is wrapped into a single-entry tar archive.
fn to_tar_bytes(filename: &str, bytes: &[u8]) -> Result<Vec<u8>, LifecycleError> {
    if filename.ends_with(".lua") {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "init.lua", bytes)
            .map_err(|e| LifecycleError::Validation(e.to_string()))?;
        builder.into_inner().map_err(|e| LifecycleError::Validation(e.to_string()))
    } else {
        let mut decoder = GzDecoder::new(bytes);
        let mut tar_bytes = Vec::new();
        decoder
            .read_to_end(&mut tar_bytes)
            .map_err(|e| LifecycleError::Validation(format!("failed to gunzip configuration bundle: {e}")))?;
        Ok(tar_bytes)
    }
}

pub async fn reconfigure(ctx: &GroupContext, group_id: GroupId, filename: String, bytes: Vec<u8>) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("reconfigure-{group_id}"), TaskKind::Reconfigure, group_id.clone());

    if let Err(e) = validate_filename(&filename) {
        task.finish_critical(e.to_string());
        return Err(e);
    }

    match reconfigure_inner(ctx, &group_id, &filename, bytes, &mut task).await {
        Ok(()) => {
            task.finish_success();
            Ok(task)
        }
        Err(e) => {
            task.finish_critical(e.to_string());
            Err(e)
        }
    }
}

async fn reconfigure_inner(ctx: &GroupContext, gid: &GroupId, filename: &str, bytes: Vec<u8>, task: &mut TaskLog) -> Result<(), LifecycleError> {
    let tar_bytes = to_tar_bytes(filename, &bytes)?;
    let deploy_dir = format!("/opt/deploy/{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"));

    let snapshot = ctx.snapshot();
    let network_name = snapshot.network_settings().network_name.clone();
    let containers = projection::containers(&snapshot, gid, &network_name);

    for instance in crate::model::InstanceNum::all() {
        let Some(view) = containers.iter().find(|c| c.instance == instance) else {
            task.log(format!("instance {instance} has no container, skipping reconfigure"));
            continue;
        };
        let client = ctx.host(&view.host)?;

        task.log(format!("deploying configuration bundle to instance {instance} at {deploy_dir}"));
        let mkdir = client.exec(&view.container_id, vec!["mkdir".to_string(), "-p".to_string(), deploy_dir.clone()]).await?;
        if mkdir.exit_code != 0 {
            return Err(LifecycleError::ExecFailed(format!("mkdir -p {deploy_dir} exited {}", mkdir.exit_code)));
        }

        client.put_archive(&view.container_id, &deploy_dir, tar_bytes.clone()).await?;

        let symlink = client
            .exec(&view.container_id, vec!["ln".to_string(), "-snf".to_string(), deploy_dir.clone(), OPT_TARANTOOL.to_string()])
            .await?;
        if symlink.exit_code != 0 {
            return Err(LifecycleError::ExecFailed(format!("symlink flip exited {}", symlink.exit_code)));
        }

        client.restart_container(&view.container_id).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_tar_gz_tgz_and_lua() {
        assert!(validate_filename("bundle.tar.gz").is_ok());
        assert!(validate_filename("bundle.tgz").is_ok());
        assert!(validate_filename("init.lua").is_ok());
    }

    #[test]
    fn rejects_unsupported_extension_before_any_side_effect() {
        assert!(validate_filename("bundle.zip").is_err());
    }
}
