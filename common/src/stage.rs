use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Un stage del pipeline: una invocación de la herramienta externa
/// (`mapredo <opciones> <plugin>`).
///
/// `name` es el plugin que ejecuta la herramienta y no cambia después de crear
/// el stage. Los campos de map/reduce los maneja el grafo (`add_mapper`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    name: String,

    /// Archivo de entrada explícito. Lo fija el compilador cuando el stage
    /// consume un archivo puente de fan-out.
    pub input_file: Option<String>,

    /// Hilos de trabajo (`-j`). Si no se fija, hereda el paralelismo global.
    pub parallelism: Option<u32>,

    /// `Some(false)` desactiva la compresión; `None` deja el default de la herramienta.
    pub compression: Option<bool>,

    /// Tamaño de buffer, se pasa tal cual (ej: "10M").
    pub buffer_size: Option<String>,

    /// Máximo de archivos abiertos durante el merge (`-f`).
    pub file_count: Option<u32>,

    map_only: bool,
    reduce_only: bool,
    subdir: Option<String>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_file: None,
            parallelism: None,
            compression: None,
            buffer_size: None,
            file_count: None,
            map_only: false,
            reduce_only: false,
            subdir: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map_only(&self) -> bool {
        self.map_only
    }

    pub fn reduce_only(&self) -> bool {
        self.reduce_only
    }

    pub fn subdir(&self) -> Option<&str> {
        self.subdir.as_deref()
    }

    /// Marca el stage como "solo map" escribiendo en `dir`.
    /// Un stage sólo puede tener un subdirectorio de staging.
    pub(crate) fn map_to_dir(&mut self, dir: &str) -> Result<()> {
        if self.subdir.is_some() {
            return Err(PipelineError::DuplicateStaging(self.name.clone()));
        }
        self.map_only = true;
        self.subdir = Some(dir.to_string());
        Ok(())
    }

    /// Marca el stage como "solo reduce" leyendo lo que dejó el mapper en `dir`.
    /// Varios mappers pueden alimentar al mismo reducer si comparten `dir`.
    pub(crate) fn reduce_from_dir(&mut self, dir: &str) -> Result<()> {
        if let Some(existing) = &self.subdir {
            if existing != dir {
                return Err(PipelineError::DuplicateStaging(self.name.clone()));
            }
        }
        self.reduce_only = true;
        self.subdir = Some(dir.to_string());
        Ok(())
    }

    /// Línea de comando propia del stage (sin pipes ni redirecciones).
    ///
    /// Un stage partido (map-only y reduce-only a la vez) genera dos
    /// invocaciones unidas con `&&`.
    pub fn command_line(&self, tool: &str) -> String {
        match (self.map_only, self.reduce_only) {
            (true, true) => format!(
                "{} && {}",
                self.invocation(tool, Mode::MapOnly),
                self.invocation(tool, Mode::ReduceOnly)
            ),
            (false, true) => self.invocation(tool, Mode::ReduceOnly),
            (true, false) => self.invocation(tool, Mode::MapOnly),
            (false, false) => self.invocation(tool, Mode::Full),
        }
    }

    fn invocation(&self, tool: &str, mode: Mode) -> String {
        let mut parts: Vec<String> = vec![tool.to_string()];

        if let Some(input) = &self.input_file {
            parts.push(format!("-i {}", quoted(input)));
        }
        if let Some(jobs) = self.parallelism {
            parts.push(format!("-j {}", jobs));
        }
        if self.compression == Some(false) {
            parts.push("--no-compression".to_string());
        }
        if let Some(buffer) = &self.buffer_size {
            parts.push(format!("-b {}", shell_word(buffer)));
        }
        if let Some(files) = self.file_count {
            parts.push(format!("-f {}", files));
        }

        let subdir = shell_word(self.subdir.as_deref().unwrap_or_default());
        match mode {
            Mode::ReduceOnly => parts.push(format!("--reduce-only -s {}", subdir)),
            Mode::MapOnly => parts.push(format!("--map-only -s {}", subdir)),
            Mode::Full => {}
        }

        parts.push(shell_word(&self.name));
        parts.join(" ")
    }
}

/// Entre comillas simples, escapando las comillas internas (`'\''`).
fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Igual que `quoted`, pero sólo si hace falta.
fn shell_word(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=+,@%".contains(c));
    if plain {
        value.to_string()
    } else {
        quoted(value)
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Full,
    MapOnly,
    ReduceOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_sin_opciones_es_herramienta_y_nombre() {
        let st = Stage::new("wordcount");
        assert_eq!(st.command_line("mapredo"), "mapredo wordcount");
    }

    #[test]
    fn command_line_respeta_orden_de_flags() {
        let mut st = Stage::new("wordsort");
        st.input_file = Some("in.txt".to_string());
        st.parallelism = Some(4);
        st.compression = Some(false);
        st.buffer_size = Some("10M".to_string());
        st.file_count = Some(20);

        assert_eq!(
            st.command_line("mapredo"),
            "mapredo -i 'in.txt' -j 4 --no-compression -b 10M -f 20 wordsort"
        );
    }

    #[test]
    fn valores_con_espacios_o_comillas_se_citan() {
        let mut st = Stage::new("word count");
        st.input_file = Some("datos de juan's.txt".to_string());
        st.buffer_size = Some("10 M".to_string());

        assert_eq!(
            st.command_line("mapredo"),
            "mapredo -i 'datos de juan'\\''s.txt' -b '10 M' 'word count'"
        );
    }

    #[test]
    fn subdir_con_metacaracteres_se_cita() {
        let mut st = Stage::new("m");
        st.map_to_dir("a;rm").unwrap();
        assert_eq!(st.command_line("mapredo"), "mapredo --map-only -s 'a;rm' m");
    }

    #[test]
    fn input_entre_comillas_corre_en_sh() {
        let mut st = Stage::new("x");
        st.input_file = Some("it's here".to_string());
        let cmd = st.command_line("printf '%s|'");
        let out = std::process::Command::new("sh").arg("-c").arg(&cmd).output().unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout), "-i|it's here|x|");
    }

    #[test]
    fn compresion_explicita_no_agrega_flag() {
        let mut st = Stage::new("wc");
        st.compression = Some(true);
        assert_eq!(st.command_line("mapredo"), "mapredo wc");
    }

    #[test]
    fn map_to_dir_dos_veces_falla() {
        let mut st = Stage::new("m");
        st.map_to_dir("d1").unwrap();
        let err = st.map_to_dir("d2").unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStaging(ref n) if n == "m"));
        assert_eq!(st.subdir(), Some("d1"));
    }

    #[test]
    fn reducer_acepta_mismo_dir_y_rechaza_otro() {
        let mut st = Stage::new("r");
        st.reduce_from_dir("dirX").unwrap();
        st.reduce_from_dir("dirX").unwrap();
        assert!(st.reduce_from_dir("dirY").is_err());
        assert_eq!(
            st.command_line("mapredo"),
            "mapredo --reduce-only -s dirX r"
        );
    }

    #[test]
    fn stage_partido_genera_dos_invocaciones() {
        let mut st = Stage::new("split");
        st.parallelism = Some(2);
        st.map_to_dir("stage").unwrap();
        st.reduce_from_dir("stage").unwrap();

        assert_eq!(
            st.command_line("mapredo"),
            "mapredo -j 2 --map-only -s stage split && mapredo -j 2 --reduce-only -s stage split"
        );
    }
}
