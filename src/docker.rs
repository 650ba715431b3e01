use crate::keymap::ResourceAction;
use crate::model::{ColumnSpec, Listing, Record, ResourceKind, ServerInfo};
use crate::provider::ResourceProvider;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    PruneContainersOptions, RemoveContainerOptions, RestartContainerOptions,
    StopContainerOptions,
};
use bollard::image::{ListImagesOptions, PruneImagesOptions, RemoveImageOptions};
use bollard::models::{ContainerSummary, HistoryResponseItem, ImageSummary, Port, Volume};
use bollard::volume::{ListVolumesOptions, PruneVolumesOptions, RemoveVolumeOptions};
use chrono::{DateTime, Local, TimeDelta};
use futures::TryStreamExt;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;

const SHA_PREFIX: &str = "sha256:";
const SHORT_ID: usize = 12;
const NONE: &str = "<none>";
const MISSING: &str = "<missing>";
const VOLUME_COLUMN_CAP: usize = 20;
const LOG_WINDOW_MINUTES: i64 = 15;

pub struct DockerProvider {
    docker: Docker,
}

impl DockerProvider {
    pub async fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("failed to connect to Docker")?;
        docker
            .ping()
            .await
            .context("Docker daemon did not answer ping")?;
        Ok(Self { docker })
    }

    async fn containers(&self) -> Result<Listing> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .context("failed to list containers")?;

        Ok(Listing::new(
            columns(&["ID", "Name", "Image", "State", "Ports"]),
            containers.iter().map(container_row).collect(),
        ))
    }

    async fn images(&self) -> Result<Listing> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };
        let images = self
            .docker
            .list_images(Some(options))
            .await
            .context("failed to list images")?;

        Ok(Listing::new(
            columns(&["ID", "Name", "Containers", "Size"]),
            images.iter().flat_map(image_rows).collect(),
        ))
    }

    async fn volumes(&self) -> Result<Listing> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await
            .context("failed to list volumes")?;

        let mut columns = vec![ColumnSpec::new("Name")];
        columns.extend(
            ["Driver", "Mount", "Created", "Scope", "Size"]
                .into_iter()
                .map(|title| ColumnSpec::new(title).capped(VOLUME_COLUMN_CAP)),
        );
        Ok(Listing::new(
            columns,
            response
                .volumes
                .unwrap_or_default()
                .iter()
                .map(volume_row)
                .collect(),
        ))
    }

    async fn save_image(&self, id: &str) -> Result<()> {
        let inspect = self
            .docker
            .inspect_image(id)
            .await
            .with_context(|| format!("failed to inspect image {id}"))?;
        let tag = inspect
            .repo_tags
            .unwrap_or_default()
            .into_iter()
            .next();
        let path = PathBuf::from(tarball_name(tag.as_deref(), id));
        info!("saving image {id} to {}", path.display());

        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut stream = std::pin::pin!(self.docker.export_image(id));
        while let Some(chunk) = stream
            .try_next()
            .await
            .with_context(|| format!("failed to export image {id}"))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        file.flush()
            .await
            .with_context(|| format!("failed to flush {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for DockerProvider {
    async fn list(&self, kind: ResourceKind) -> Result<Listing> {
        match kind {
            ResourceKind::Containers => self.containers().await,
            ResourceKind::Images => self.images().await,
            ResourceKind::Volumes => self.volumes().await,
        }
    }

    async fn inspect(&self, kind: ResourceKind, id: &str) -> Result<Listing> {
        let value = match kind {
            ResourceKind::Containers => serde_json::to_value(
                self.docker
                    .inspect_container(id, None::<InspectContainerOptions>)
                    .await
                    .with_context(|| format!("failed to inspect container {id}"))?,
            ),
            ResourceKind::Images => serde_json::to_value(
                self.docker
                    .inspect_image(id)
                    .await
                    .with_context(|| format!("failed to inspect image {id}"))?,
            ),
            ResourceKind::Volumes => serde_json::to_value(
                self.docker
                    .inspect_volume(id)
                    .await
                    .with_context(|| format!("failed to inspect volume {id}"))?,
            ),
        }
        .context("failed to encode inspect response")?;

        Ok(Listing::new(columns(&["Name", "Value"]), flatten(&value)))
    }

    async fn history(&self, image: &str) -> Result<Listing> {
        let mut layers = self
            .docker
            .image_history(image)
            .await
            .with_context(|| format!("failed to read history of {image}"))?;
        layers.reverse();

        Ok(Listing::new(
            columns(&["ID", "Created", "Created By", "Size", "Comment"]),
            layers.iter().map(history_row).collect(),
        ))
    }

    async fn logs(&self, container: &str) -> Result<Listing> {
        let since = Local::now() - TimeDelta::minutes(LOG_WINDOW_MINUTES);
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            timestamps: true,
            since: since.timestamp(),
            tail: "all".to_string(),
            ..Default::default()
        };
        let chunks = self
            .docker
            .logs(container, Some(options))
            .try_collect::<Vec<_>>()
            .await
            .with_context(|| format!("failed to read logs of {container}"))?;

        let rows = chunks
            .iter()
            .flat_map(|chunk| {
                let stream = match chunk {
                    LogOutput::StdOut { .. } => "stdout",
                    LogOutput::StdErr { .. } => "stderr",
                    LogOutput::StdIn { .. } => "stdin",
                    LogOutput::Console { .. } => "console",
                };
                log_rows(stream, &chunk.to_string())
            })
            .collect();

        Ok(Listing::new(columns(&["Time", "Stream", "Message"]), rows))
    }

    async fn perform(
        &self,
        kind: ResourceKind,
        action: ResourceAction,
        target: Option<&str>,
    ) -> Result<()> {
        let id = || target.with_context(|| format!("{action} needs a selected {}", kind.noun()));

        match (kind, action) {
            (ResourceKind::Containers, ResourceAction::Restart) => self
                .docker
                .restart_container(id()?, None::<RestartContainerOptions>)
                .await
                .context("restart failed")?,
            (ResourceKind::Containers, ResourceAction::Stop) => self
                .docker
                .stop_container(id()?, None::<StopContainerOptions>)
                .await
                .context("stop failed")?,
            (ResourceKind::Containers, ResourceAction::Remove) => self
                .docker
                .remove_container(
                    id()?,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
                .context("remove failed")?,
            (ResourceKind::Containers, ResourceAction::Prune) => {
                let report = self
                    .docker
                    .prune_containers(None::<PruneContainersOptions<String>>)
                    .await
                    .context("container prune failed")?;
                info!(
                    "pruned {} containers, reclaimed {}",
                    report.containers_deleted.unwrap_or_default().len(),
                    human_size(report.space_reclaimed.unwrap_or_default())
                );
            }
            (ResourceKind::Images, ResourceAction::Remove) => {
                self.docker
                    .remove_image(id()?, None::<RemoveImageOptions>, None)
                    .await
                    .context("image remove failed")?;
            }
            (ResourceKind::Images, ResourceAction::Prune) => {
                let options = PruneImagesOptions {
                    filters: HashMap::from([("dangling".to_string(), vec!["true".to_string()])]),
                };
                let report = self
                    .docker
                    .prune_images(Some(options))
                    .await
                    .context("image prune failed")?;
                info!(
                    "pruned {} images, reclaimed {}",
                    report.images_deleted.unwrap_or_default().len(),
                    human_size(report.space_reclaimed.unwrap_or_default())
                );
            }
            (ResourceKind::Images, ResourceAction::Save) => self.save_image(id()?).await?,
            (ResourceKind::Volumes, ResourceAction::Remove) => self
                .docker
                .remove_volume(id()?, None::<RemoveVolumeOptions>)
                .await
                .context("volume remove failed")?,
            (ResourceKind::Volumes, ResourceAction::Prune) => {
                let report = self
                    .docker
                    .prune_volumes(None::<PruneVolumesOptions<String>>)
                    .await
                    .context("volume prune failed")?;
                info!(
                    "pruned {} volumes, reclaimed {}",
                    report.volumes_deleted.unwrap_or_default().len(),
                    human_size(report.space_reclaimed.unwrap_or_default())
                );
            }
            _ => bail!("{action} is not supported for {}", kind.command()),
        }
        Ok(())
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        let info = self
            .docker
            .info()
            .await
            .context("failed to read server info")?;
        let client = self.docker.client_version();

        Ok(ServerInfo {
            name: info.name.unwrap_or_default(),
            server_version: info.server_version.unwrap_or_default(),
            client_version: format!("{}.{}", client.major_version, client.minor_version),
            images: info.images.unwrap_or_default(),
            running: info.containers_running.unwrap_or_default(),
            paused: info.containers_paused.unwrap_or_default(),
            stopped: info.containers_stopped.unwrap_or_default(),
        })
    }
}

fn columns(titles: &[&str]) -> Vec<ColumnSpec> {
    titles.iter().map(|title| ColumnSpec::new(*title)).collect()
}

fn short_id(id: &str) -> String {
    id.strip_prefix(SHA_PREFIX)
        .unwrap_or(id)
        .chars()
        .take(SHORT_ID)
        .collect()
}

fn container_row(container: &ContainerSummary) -> Record {
    let name = container
        .names
        .as_deref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| NONE.to_string());

    vec![
        short_id(container.id.as_deref().unwrap_or_default()),
        name,
        container.image.clone().unwrap_or_default(),
        container.state.clone().unwrap_or_default(),
        display_ports(container.ports.as_deref().unwrap_or_default()),
    ]
}

fn display_ports(ports: &[Port]) -> String {
    ports
        .iter()
        .map(|port| match port.public_port {
            Some(public) => format!("{public}:{}", port.private_port),
            None => port.private_port.to_string(),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",")
}

fn image_rows(image: &ImageSummary) -> Vec<Record> {
    let id = short_id(&image.id);
    let containers = image.containers.max(0).to_string();
    let size = human_size(image.size);

    let tags = image
        .repo_tags
        .iter()
        .filter(|tag| tag.as_str() != "<none>:<none>")
        .collect::<Vec<_>>();
    if tags.is_empty() {
        return vec![vec![id, NONE.to_string(), containers, size]];
    }

    tags.into_iter()
        .map(|tag| vec![id.clone(), tag.clone(), containers.clone(), size.clone()])
        .collect()
}

fn volume_row(volume: &Volume) -> Record {
    let size = volume
        .usage_data
        .as_ref()
        .filter(|usage| usage.size >= 0)
        .map(|usage| human_size(usage.size))
        .unwrap_or_default();

    vec![
        volume.name.clone(),
        volume.driver.clone(),
        volume.mountpoint.clone(),
        volume.created_at.clone().unwrap_or_default(),
        volume
            .scope
            .as_ref()
            .map(|scope| scope.to_string())
            .unwrap_or_default(),
        size,
    ]
}

fn history_row(layer: &HistoryResponseItem) -> Record {
    let id = if layer.id == MISSING {
        String::new()
    } else {
        short_id(&layer.id)
    };
    let created = DateTime::from_timestamp(layer.created, 0)
        .map(|created| {
            created
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| layer.created.to_string());

    vec![
        id,
        created,
        layer.created_by.clone(),
        human_size(layer.size),
        layer.comment.clone(),
    ]
}

fn log_rows(stream: &str, chunk: &str) -> Vec<Record> {
    chunk
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (time, message) = match line.split_once(' ') {
                Some((stamp, message)) => match DateTime::parse_from_rfc3339(stamp) {
                    Ok(time) => (
                        time.with_timezone(&Local).format("%H:%M:%S").to_string(),
                        message,
                    ),
                    Err(_) => (String::new(), line),
                },
                None => (String::new(), line),
            };
            vec![time, stream.to_string(), message.to_string()]
        })
        .collect()
}

fn tarball_name(tag: Option<&str>, id: &str) -> String {
    let base = match tag {
        Some(tag) => tag.rsplit('/').next().unwrap_or(tag).to_string(),
        None => short_id(id),
    };
    format!("./{}.tar", base.replace(':', "-"))
}

fn human_size(bytes: i64) -> String {
    const KB: f64 = 1000.0;
    const MB: f64 = KB * 1000.0;
    const GB: f64 = MB * 1000.0;

    let value = bytes.max(0) as f64;
    if value >= GB {
        format!("{:.1}GB", value / GB)
    } else if value >= MB {
        format!("{:.1}MB", value / MB)
    } else if value >= KB {
        format!("{:.0}kB", value / KB)
    } else {
        format!("{}B", bytes.max(0))
    }
}

fn flatten(value: &Value) -> Vec<Record> {
    let mut rows = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, child) in sorted(map) {
                flatten_into(key, child, 0, &mut rows);
            }
        }
        other => flatten_into("", other, 0, &mut rows),
    }
    rows
}

fn flatten_into(name: &str, value: &Value, depth: usize, rows: &mut Vec<Record>) {
    let label = format!("{}{name}", " ".repeat(depth * 4));
    match value {
        Value::Null => {}
        Value::Bool(flag) => rows.push(vec![label, flag.to_string()]),
        Value::Number(number) => rows.push(vec![label, number.to_string()]),
        Value::String(text) => rows.push(vec![label, text.clone()]),
        Value::Array(items) if items.iter().all(is_scalar) => {
            let joined = items
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(", ");
            let value = if joined.is_empty() {
                String::new()
            } else {
                format!("[{joined}]")
            };
            rows.push(vec![label, value]);
        }
        Value::Array(items) => {
            rows.push(vec![label, String::new()]);
            for (index, item) in items.iter().enumerate() {
                flatten_into(&format!("[{index}]"), item, depth + 1, rows);
            }
        }
        Value::Object(map) => {
            rows.push(vec![label, String::new()]);
            for (key, child) in sorted(map) {
                flatten_into(key, child, depth + 1, rows);
            }
        }
    }
}

fn sorted(map: &serde_json::Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries = map.iter().collect::<Vec<_>>();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        container_row, display_ports, flatten, history_row, human_size, image_rows, log_rows,
        short_id, tarball_name,
    };
    use bollard::models::{ContainerSummary, HistoryResponseItem, ImageSummary, Port};
    use serde_json::json;

    fn port(private: u16, public: Option<u16>) -> Port {
        Port {
            private_port: private,
            public_port: public,
            ..Default::default()
        }
    }

    #[test]
    fn ids_are_shortened_without_digest_prefix() {
        assert_eq!(short_id("sha256:0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn ports_are_deduplicated_and_sorted() {
        let ports = vec![
            port(80, Some(8080)),
            port(443, Some(8443)),
            port(80, Some(8080)),
            port(9000, None),
        ];
        assert_eq!(display_ports(&ports), "8080:80,8443:443,9000");
        assert_eq!(display_ports(&[]), "");
    }

    #[test]
    fn container_rows_strip_the_name_slash() {
        let container = ContainerSummary {
            id: Some("0123456789abcdef".to_string()),
            names: Some(vec!["/web".to_string(), "/alias".to_string()]),
            image: Some("nginx:latest".to_string()),
            state: Some("running".to_string()),
            ports: Some(vec![port(80, Some(8080))]),
            ..Default::default()
        };
        assert_eq!(
            container_row(&container),
            vec!["0123456789ab", "web", "nginx:latest", "running", "8080:80"]
        );

        let unnamed = ContainerSummary::default();
        assert_eq!(container_row(&unnamed)[1], "<none>");
    }

    #[test]
    fn images_get_one_row_per_tag() {
        let image = ImageSummary {
            id: "sha256:feedfacecafebeef00".to_string(),
            repo_tags: vec!["app:1".to_string(), "app:latest".to_string()],
            containers: 2,
            size: 1_500_000,
            ..Default::default()
        };
        let rows = image_rows(&image);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["feedfacecafe", "app:latest", "2", "1.5MB"]);

        let dangling = ImageSummary {
            id: "sha256:00".to_string(),
            repo_tags: vec!["<none>:<none>".to_string()],
            containers: -1,
            ..Default::default()
        };
        assert_eq!(image_rows(&dangling), vec![vec!["00", "<none>", "0", "0B"]]);
    }

    #[test]
    fn missing_history_ids_are_blank() {
        let layer = HistoryResponseItem {
            id: "<missing>".to_string(),
            created: 0,
            created_by: "/bin/sh -c #(nop) CMD".to_string(),
            size: 0,
            comment: String::new(),
            ..Default::default()
        };
        let row = history_row(&layer);
        assert_eq!(row[0], "");
        assert_eq!(row[2], "/bin/sh -c #(nop) CMD");
        assert_eq!(row[3], "0B");
    }

    #[test]
    fn sizes_use_decimal_units() {
        assert_eq!(human_size(999), "999B");
        assert_eq!(human_size(12_345), "12kB");
        assert_eq!(human_size(2_500_000_000), "2.5GB");
        assert_eq!(human_size(-1), "0B");
    }

    #[test]
    fn inspect_output_is_flattened_with_indentation() {
        let value = json!({
            "Id": "abc",
            "Config": {
                "Env": ["A=1", "B=2"],
                "Labels": null,
                "Tty": false
            },
            "Mounts": [{"Type": "volume"}],
            "Args": []
        });
        let rows = flatten(&value);
        let pairs = rows
            .iter()
            .map(|row| (row[0].as_str(), row[1].as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                ("Args", ""),
                ("Config", ""),
                ("    Env", "[A=1, B=2]"),
                ("    Tty", "false"),
                ("Id", "abc"),
                ("Mounts", ""),
                ("    [0]", ""),
                ("        Type", "volume"),
            ]
        );
    }

    #[test]
    fn log_lines_split_timestamp_and_message() {
        let rows = log_rows("stderr", "2024-05-01T10:20:30.123456789Z boom happened\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "stderr");
        assert_eq!(rows[0][2], "boom happened");
        assert_eq!(rows[0][0].len(), 8);

        let raw = log_rows("stdout", "no timestamp here");
        assert_eq!(raw[0], vec!["", "stdout", "no timestamp here"]);
    }

    #[test]
    fn tarballs_are_named_after_the_tag() {
        assert_eq!(
            tarball_name(Some("registry.local/team/app:1.2"), "sha256:abc"),
            "./app-1.2.tar"
        );
        assert_eq!(tarball_name(None, "sha256:abcdef"), "./abcdef.tar");
    }
}
