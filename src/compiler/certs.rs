//! NSS certificate database for an instance.
//!
//! Without an `[ssl]` table the instance gets a self-signed CA and server
//! certificate generated with `certutil`. With one, the given certificate,
//! CA bundle and key are concatenated, converted to PKCS#12 and imported.
//! Either way the CA and server certificates end up exported as PEM into
//! the module's cacerts directory.

use super::instance::InstanceRefs;
use super::{BIN_PATH, BaseRefs, ExternalSsl, InstanceParams, SBIN_PATH};
use crate::platform::Platform;
use declarative::{
    CatalogBuilder, ExecAttrs, FileAttrs, Resource, ResourceRef, Result, shell_quote,
};

/// What the SSL stage needs from the certificate database
#[derive(Debug, Clone)]
pub(super) struct CertRefs {
    /// Exec marking the server certificate as trusted
    pub server_trust: ResourceRef,
    /// Nickname of the server certificate in the database
    pub cert_name: String,
}

pub(super) fn declare(
    builder: &mut CatalogBuilder,
    instance: &InstanceParams,
    base: &BaseRefs,
    platform: &Platform,
    refs: &InstanceRefs,
) -> Result<CertRefs> {
    let rehash = builder.declare(Resource::exec(
        instance.title("Rehash cacertdir"),
        ExecAttrs::new(format!(
            "{} {}",
            platform.rehash_command, instance.cacerts_path
        ))
        .path(SBIN_PATH)
        .refreshonly(),
    ))?;
    let certs = Certs {
        instance,
        base,
        refs,
        rehash,
    };

    match &instance.ssl {
        None => certs.self_signed(builder),
        Some(ssl) => certs.external(builder, platform, ssl),
    }
}

struct Certs<'a> {
    instance: &'a InstanceParams,
    base: &'a BaseRefs,
    refs: &'a InstanceRefs,
    rehash: ResourceRef,
}

impl Certs<'_> {
    fn dir(&self) -> String {
        self.instance.dir()
    }

    fn noise_file(&self) -> String {
        format!("/tmp/noisefile-{}", self.instance.server_id)
    }

    fn pass_file(&self) -> String {
        format!("/tmp/passfile-{}", self.instance.server_id)
    }

    fn refresh_exec(
        &self,
        builder: &mut CatalogBuilder,
        action: &str,
        command: String,
    ) -> Result<ResourceRef> {
        builder.declare(Resource::exec(
            self.instance.title(action),
            ExecAttrs::new(command).path(BIN_PATH).refreshonly(),
        ))
    }

    /// Mark `nickname` trusted unless `certutil -L` already shows the flags
    fn trust(
        &self,
        builder: &mut CatalogBuilder,
        action: &str,
        nickname: &str,
        flags: &str,
    ) -> Result<ResourceRef> {
        let dir = self.dir();
        let check = flags.trim_end_matches(',');
        builder.declare(Resource::exec(
            self.instance.title(action),
            ExecAttrs::new(format!("certutil -M -n \"{nickname}\" -t {flags} -d {dir}"))
                .path(BIN_PATH)
                .unless(format!(
                    "certutil -L -d {dir} | grep \"{nickname}\" | grep \"{check}\""
                )),
        ))
    }

    /// Export `nickname` as `<pem>` in the instance directory and publish it
    /// in the cacerts directory
    fn export(
        &self,
        builder: &mut CatalogBuilder,
        action: &str,
        nickname: &str,
        pem: &str,
    ) -> Result<ResourceRef> {
        let dir = self.dir();
        let exported = format!("{dir}/{pem}");
        let export = builder.declare(Resource::exec(
            self.instance.title(action),
            ExecAttrs::new(format!("certutil -d {dir} -L -n \"{nickname}\" -a > {pem}"))
                .cwd(&dir)
                .path(BIN_PATH)
                .creates(&exported),
        ))?;
        let published = builder.declare(Resource::file(
            format!("{}/{pem}", self.instance.cacerts_path),
            FileAttrs::file().source(exported),
        ))?;
        builder
            .require(&published, &export)
            .require(&published, &self.base.cacerts_dir)
            .notify(&published, &self.rehash);
        Ok(export)
    }

    fn self_signed(&self, builder: &mut CatalogBuilder) -> Result<CertRefs> {
        let instance = self.instance;
        let id = &instance.server_id;
        let host = &instance.server_host;
        let dir = self.dir();
        let (noise, pass) = (self.noise_file(), self.pass_file());
        let ca_name = format!("{id}CA");
        let cert_name = format!("{id}Cert");

        let noise_exec = self.refresh_exec(
            builder,
            "Generate noise file",
            format!(
                "echo {} | sha256sum | awk '{{print $1}}' > {noise}",
                noise_seed(host, id)
            ),
        )?;
        let pass_exec = self.refresh_exec(
            builder,
            "Generate password file",
            format!("echo {} > {pass}", shell_quote(&instance.root_dn_pass)),
        )?;
        let cert_db = self.refresh_exec(
            builder,
            "Create cert DB",
            format!("certutil -N -d {dir} -f {pass}"),
        )?;
        let key_pair = self.refresh_exec(
            builder,
            "Generate key pair",
            format!("certutil -G -d {dir} -g 4096 -z {noise} -f {pass}"),
        )?;
        let make_ca = builder.declare(Resource::exec(
            instance.title("Make ca cert and add to database"),
            ExecAttrs::new(format!(
                "certutil -S -n \"{ca_name}\" -s \"cn={ca_name},dc={host}\" -x -t \"CT,,\" \
                 -v 120 -d {dir} -k rsa -z {noise} -f {pass} ; sleep 2"
            ))
            .cwd(&dir)
            .path(BIN_PATH)
            .refreshonly(),
        ))?;
        let ca_trust = self.trust(builder, "Add trust for CA", &ca_name, "CT,,")?;

        let san = if instance.subject_alt_names.is_empty() {
            String::new()
        } else {
            format!("-8 {}", instance.subject_alt_names.join(","))
        };
        let make_server = builder.declare(Resource::exec(
            instance.title("Make server cert and add to database"),
            ExecAttrs::new(format!(
                "certutil -S -n \"{cert_name}\" -m 101 -s \"cn={host}\" -c \"{ca_name}\" \
                 -t \"u,u,u\" -v 120 -d {dir} -k rsa -z {noise} -f {pass} {san} ; sleep 2"
            ))
            .cwd(&dir)
            .path(BIN_PATH)
            .refreshonly(),
        ))?;
        let server_trust = self.trust(builder, "Add trust for server cert", &cert_name, "u,u,u")?;

        let permissions = builder.declare(Resource::exec(
            instance.title("Set permissions on database directory"),
            ExecAttrs::new(format!("/bin/chown {}:{} {dir}", instance.user, instance.group))
                .refreshonly(),
        ))?;
        let cleanup = builder.declare(Resource::exec(
            instance.title("Clean up temp files"),
            ExecAttrs::new(format!("/bin/rm -f {noise} {pass}")).refreshonly(),
        ))?;

        let export_ca =
            self.export(builder, "Export CA cert", &ca_name, &format!("{ca_name}.pem"))?;
        let export_server = self.export(
            builder,
            "Export server cert",
            &cert_name,
            &format!("{cert_name}.pem"),
        )?;

        builder
            .subscribe(&noise_exec, &self.refs.token_stop)
            .notify(&noise_exec, &pass_exec)
            .notify(&pass_exec, &cert_db)
            .notify(&cert_db, &key_pair)
            .notify(&key_pair, &make_ca)
            .notify(&make_ca, &make_server)
            .notify(&make_ca, &cleanup)
            .notify(&make_ca, &ca_trust)
            .notify(&ca_trust, &export_ca)
            .notify(&make_server, &permissions)
            .notify(&make_server, &cleanup)
            .notify(&make_server, &server_trust)
            .notify(&server_trust, &export_server)
            .notify(&permissions, &self.refs.token_restart)
            .before(&ca_trust, &self.refs.token_restart)
            .before(&server_trust, &self.refs.token_restart);

        Ok(CertRefs {
            server_trust,
            cert_name,
        })
    }

    fn external(
        &self,
        builder: &mut CatalogBuilder,
        platform: &Platform,
        ssl: &ExternalSsl,
    ) -> Result<CertRefs> {
        let instance = self.instance;
        let id = &instance.server_id;
        let dir = self.dir();
        let bundle_path = format!("{}/{id}-bundle.pem", platform.bundle_dir);
        let p12 = format!("{}/{id}.p12", platform.bundle_dir);

        let bundle = builder.declare(Resource::file(
            &bundle_path,
            FileAttrs::file()
                .source(&ssl.cert_path)
                .source(&ssl.ca_bundle_path)
                .source(&ssl.key_path)
                .mode("0600"),
        ))?;
        let pkcs12 = self.refresh_exec(
            builder,
            "Create pkcs12 cert",
            format!(
                "openssl pkcs12 -export -password pass:{} -name {} -in {bundle_path} -out {p12}",
                shell_quote(&instance.cert_db_pass),
                instance.server_host
            ),
        )?;
        let cert_db = self.refresh_exec(
            builder,
            "Create cert DB",
            format!(
                "pk12util -i {p12} -d {dir} -W {} -K {}",
                shell_quote(&instance.cert_db_pass),
                shell_quote(&instance.root_dn_pass)
            ),
        )?;
        builder
            .require(&bundle, &self.refs.setup)
            .require(&bundle, &self.refs.token_stop)
            .notify(&bundle, &pkcs12)
            .notify(&pkcs12, &cert_db)
            .notify(&cert_db, &self.refs.token_restart);

        for (index, name) in ssl.ca_cert_names.iter().enumerate() {
            let trust = self.trust(builder, &format!("Add trust for CA{index}"), name, "CT,,")?;
            let export = self.export(
                builder,
                &format!("Export CA cert {index}"),
                name,
                &format!("{id}CA{index}.pem"),
            )?;
            builder
                .require(&trust, &cert_db)
                .notify(&trust, &export)
                .before(&trust, &self.refs.token_restart);
        }

        let server_trust =
            self.trust(builder, "Add trust for server cert", &ssl.cert_name, "u,u,u")?;
        builder
            .require(&server_trust, &cert_db)
            .before(&server_trust, &self.refs.token_restart);

        Ok(CertRefs {
            server_trust,
            cert_name: ssl.cert_name.clone(),
        })
    }
}

/// Digits echoed into the noise file.
///
/// Derived from the host and server id so recompiling yields the same
/// catalog.
fn noise_seed(host: &str, server_id: &str) -> u64 {
    let hash = blake3::hash(format!("{host}:{server_id}:noise").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
