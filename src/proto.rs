//! Protobuf schema parsing.
//!
//! Extracts just what is needed to map a `.proto` file onto the Java
//! classes its code generator produces: the package, the `java_*` options,
//! and the top-level message/enum/service names.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtoFile {
    pub package: Option<String>,
    pub java_package: Option<String>,
    pub java_outer_classname: Option<String>,
    pub java_multiple_files: bool,
    /// Top-level message/enum/service names, in declaration order.
    pub definitions: Vec<String>,
}

/// Parse a `.proto` text. Tolerant by design: anything it does not
/// understand is skipped, so a syntactically odd file yields a partial
/// result rather than an error.
pub fn read_proto(content: &str) -> ProtoFile {
    let stripped = strip_comments(content);
    let mut proto = ProtoFile::default();

    let tokens = tokenize(&stripped);
    let mut depth = 0usize;
    let mut i = 0usize;
    while i < tokens.len() {
        match tokens[i].as_str() {
            "{" => depth += 1,
            "}" => depth = depth.saturating_sub(1),
            "package" if depth == 0 => {
                if let Some(name) = tokens.get(i + 1) {
                    proto.package = Some(name.clone());
                    i += 1;
                }
            }
            "option" if depth == 0 => {
                // option <name> = <value> ;
                if let (Some(name), Some(eq), Some(value)) =
                    (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3))
                    && eq == "="
                {
                    let value = value.trim_matches('"');
                    match name.as_str() {
                        "java_package" => proto.java_package = Some(value.to_string()),
                        "java_outer_classname" => {
                            proto.java_outer_classname = Some(value.to_string())
                        }
                        "java_multiple_files" => proto.java_multiple_files = value == "true",
                        _ => {}
                    }
                    i += 3;
                }
            }
            "message" | "enum" | "service" if depth == 0 => {
                if let Some(name) = tokens.get(i + 1)
                    && is_identifier(name)
                {
                    proto.definitions.push(name.clone());
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    proto
}

/// Logical Java class names generated for this proto file.
///
/// With `java_multiple_files` each top-level definition becomes its own
/// outer class next to the file's outer class; otherwise the definitions
/// nest inside the outer class.
pub fn generated_class_names(proto: &ProtoFile, file_base_name: &str) -> Vec<String> {
    let outer = proto
        .java_outer_classname
        .clone()
        .unwrap_or_else(|| camel_case(file_base_name));
    let pkg = proto
        .java_package
        .clone()
        .or_else(|| proto.package.clone())
        .unwrap_or_default();

    let qualify = |name: &str| {
        if pkg.is_empty() {
            name.to_string()
        } else {
            format!("{pkg}.{name}")
        }
    };

    let full_outer = qualify(&outer);
    let mut names = vec![full_outer.clone()];
    for def in &proto.definitions {
        if proto.java_multiple_files {
            names.push(qualify(def));
        } else {
            names.push(format!("{full_outer}.{def}"));
        }
    }
    names
}

fn strip_comments(content: &str) -> String {
    let bytes = content.as_bytes();
    let mut out = String::with_capacity(content.len());
    let mut i = 0usize;
    let mut in_string = false;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            out.push(c);
            if c == '"' && bytes.get(i.wrapping_sub(1)) != Some(&b'\\') {
                in_string = false;
            }
            i += 1;
        } else if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
        } else if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
        } else if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            out.push(' ');
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for c in content.chars() {
        if in_string {
            current.push(c);
            if c == '"' {
                in_string = false;
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        match c {
            '"' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                in_string = true;
                current.push(c);
            }
            '{' | '}' | '=' | ';' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `my_service.proto` -> `MyService`, matching protoc's default outer
/// class naming.
pub fn camel_case(base_name: &str) -> String {
    let mut out = String::new();
    let mut upper_next = true;
    for c in base_name.chars() {
        if c == '_' || c == '-' || c == '.' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
