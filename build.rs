use anyhow::Result;

fn main() -> Result<()> {
    #[cfg(feature = "tflite")]
    tflite::generate_bindings()?;
    Ok(())
}

#[cfg(feature = "tflite")]
mod tflite {
    use anyhow::{anyhow, Context, Result};
    use std::{env, path::PathBuf};

    pub(super) fn generate_bindings() -> Result<()> {
        let edgetpu = env::var_os("CARGO_FEATURE_EDGETPU").is_some();

        let mut bindings = bindgen::Builder::default()
            .header("wrapper.h")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks))
            .allowlist_function("TfLite.*")
            .allowlist_type("TfLite.*")
            .rustfmt_bindings(true)
            .newtype_enum(".+")
            .derive_debug(true)
            .impl_debug(true)
            .size_t_is_usize(true)
            .opaque_type("max_align_t");

        if edgetpu {
            bindings = bindings
                .clang_arg("-DWITH_EDGETPU")
                .allowlist_function("edgetpu_.*")
                .allowlist_type("edgetpu_.*");
        }

        let libs: &[&str] = if edgetpu {
            &["tensorflow-lite", "edgetpu"]
        } else {
            &["tensorflow-lite"]
        };
        for lib in libs {
            // fall back to the default search path when there is no .pc file
            match pkg_config::Config::new().probe(lib) {
                Ok(library) => {
                    for include_path in library.include_paths {
                        bindings = bindings.clang_arg(format!("-I{}", include_path.display()));
                    }
                }
                Err(_) => println!("cargo:rustc-link-lib={}", lib),
            }
        }

        bindings
            .generate()
            .map_err(|_| anyhow!("unable to generate bindings"))?
            .write_to_file(
                PathBuf::from(env::var("OUT_DIR").context("OUT_DIR environment variable not defined")?)
                    .join("bindings.rs"),
            )
            .context("failed to write bindings to file")?;

        println!("cargo:rerun-if-changed=wrapper.h");
        Ok(())
    }
}
