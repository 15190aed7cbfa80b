//! Stage materialization
//!
//! Turns a package recipe plus its resolved revision and dependency tags into
//! the final stage text handed to the builder. The text is also what the tag
//! hashes over, so everything that should invalidate a stage (revision,
//! dependency tags, recipe) must appear in it.

use crate::core::manifest::{ImageConfig, PackageSpec};

/// A dependency edge resolved to the tag of the dependency's image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTag {
    /// Dependency package name
    pub name: String,
    /// Tag of the dependency's image
    pub tag: String,
}

/// A built package as seen by the final image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackage {
    /// Package name
    pub name: String,
    /// Revision the package was built from
    pub revision: String,
    /// Image tag
    pub tag: String,
}

/// Substitute `{package}`, `{name}`, `{rev}` and `{prefix}` in a template.
///
/// Other brace expressions are shell syntax and are left untouched.
///
/// # Examples
/// ```
/// use stagebuild::core::manifest::PackageSpec;
/// use stagebuild::core::materialize::substitute;
///
/// let pkg = PackageSpec::new("openbmc/sdbusplus");
/// let url = substitute("https://github.com/{package}/archive/{rev}.tar.gz", &pkg, "abc", "/usr");
/// assert_eq!(url, "https://github.com/openbmc/sdbusplus/archive/abc.tar.gz");
/// ```
pub fn substitute(template: &str, spec: &PackageSpec, revision: &str, prefix: &str) -> String {
    template
        .replace("{package}", &spec.name)
        .replace("{name}", spec.short_name())
        .replace("{rev}", revision)
        .replace("{prefix}", prefix)
}

/// Render the stage text of one package
///
/// `dependencies` must follow the order of `spec.depends`.
pub fn render_stage(
    image: &ImageConfig,
    spec: &PackageSpec,
    revision: &str,
    dependencies: &[DependencyTag],
) -> String {
    let prefix = image.prefix.as_str();
    let mut lines = vec![
        format!("# {} @ {revision}", spec.name),
        format!("FROM {} AS {}", image.base, spec.stage_name()),
    ];

    for dep in dependencies {
        lines.push(format!("COPY --from={} {prefix} {prefix}", dep.tag));
    }

    let mut commands = Vec::new();
    if let Some(url) = &spec.url {
        let url = substitute(url, spec, revision, prefix);
        commands.push(format!("curl -fsSL {url} | tar -xz"));
        commands.push(format!("cd {}*", spec.short_name()));
    }
    commands.extend(
        spec.steps
            .iter()
            .map(|step| substitute(step, spec, revision, prefix)),
    );
    if !commands.is_empty() {
        lines.push(format!("RUN {}", commands.join(" && ")));
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// `name:rev,` for every package, sorted by name
///
/// Embedded in the final image so a revision change anywhere refreshes it.
pub fn depcache(packages: &[BuiltPackage]) -> String {
    let mut entries: Vec<String> = packages
        .iter()
        .map(|p| format!("{}:{},", p.name, p.revision))
        .collect();
    entries.sort();
    entries.concat()
}

/// Render the final image combining every package stage
pub fn render_final(image: &ImageConfig, packages: &[BuiltPackage]) -> String {
    let prefix = image.prefix.as_str();
    let mut lines = vec![format!("FROM {}", image.base)];
    for pkg in packages {
        lines.push(format!("COPY --from={} {prefix} {prefix}", pkg.tag));
    }
    lines.push(format!("# depcache: {}", depcache(packages)));
    if !image.final_steps.is_empty() {
        lines.push(format!("RUN {}", image.final_steps.join(" && ")));
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageConfig {
        ImageConfig {
            base: "ubuntu:noble".to_string(),
            prefix: "/usr/local".to_string(),
            ..ImageConfig::default()
        }
    }

    #[test]
    fn test_substitute_leaves_shell_braces() {
        let pkg = PackageSpec::new("openbmc/phosphor-logging");
        let out = substitute(
            "meson setup build -Dprefix={prefix} ${MESON_FLAGS} {unknown} {name}@{rev}",
            &pkg,
            "r1",
            "/usr",
        );
        assert_eq!(
            out,
            "meson setup build -Dprefix=/usr ${MESON_FLAGS} {unknown} phosphor-logging@r1"
        );
    }

    #[test]
    fn test_render_stage_with_url_and_deps() {
        let mut pkg = PackageSpec::new("openbmc/sdbusplus")
            .with_depends(&["boost"])
            .with_steps(&["meson setup build", "ninja -C build install"]);
        pkg.url = Some("https://github.com/{package}/archive/{rev}.tar.gz".to_string());
        let deps = vec![DependencyTag {
            name: "boost".to_string(),
            tag: "repo-boost:w-1".to_string(),
        }];

        let text = render_stage(&image(), &pkg, "abc", &deps);
        assert_eq!(
            text,
            "# openbmc/sdbusplus @ abc\n\
             FROM ubuntu:noble AS openbmc-sdbusplus\n\
             COPY --from=repo-boost:w-1 /usr/local /usr/local\n\
             RUN curl -fsSL https://github.com/openbmc/sdbusplus/archive/abc.tar.gz | tar -xz \
             && cd sdbusplus* && meson setup build && ninja -C build install\n"
        );
    }

    #[test]
    fn test_render_stage_without_recipe() {
        let pkg = PackageSpec::new("meta");
        let text = render_stage(&image(), &pkg, "r0", &[]);
        assert_eq!(text, "# meta @ r0\nFROM ubuntu:noble AS meta\n");
    }

    #[test]
    fn test_revision_changes_stage_text() {
        let pkg = PackageSpec::new("lib").with_steps(&["make install"]);
        assert_ne!(
            render_stage(&image(), &pkg, "r1", &[]),
            render_stage(&image(), &pkg, "r2", &[])
        );
    }

    #[test]
    fn test_depcache_sorted() {
        let pkgs = vec![
            BuiltPackage {
                name: "zlib".to_string(),
                revision: "1".to_string(),
                tag: "t1".to_string(),
            },
            BuiltPackage {
                name: "boost".to_string(),
                revision: "2".to_string(),
                tag: "t2".to_string(),
            },
        ];
        assert_eq!(depcache(&pkgs), "boost:2,zlib:1,");

        let mut img = image();
        img.final_steps = vec!["ldconfig".to_string()];
        let text = render_final(&img, &pkgs);
        assert_eq!(
            text,
            "FROM ubuntu:noble\n\
             COPY --from=t1 /usr/local /usr/local\n\
             COPY --from=t2 /usr/local /usr/local\n\
             # depcache: boost:2,zlib:1,\n\
             RUN ldconfig\n"
        );
    }
}
