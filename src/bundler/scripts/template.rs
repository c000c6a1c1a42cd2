//! Shell script templates.

/// Bulk upload through curl over FTP.
pub const UPLOAD_CURL_TEMPLATE: &str = r#"#!/bin/bash
# Uploads {{build_mode}} bundles for {{build_target}} ({{app_version}}).

ROOT_URL="{{root_url}}"
VERIFY_CODE="{{credentials}}"
UPLOAD_FROM_ROOT_DIR="{{local_root}}"

# $1 directory relative to the server root
checkUploadDir()
{
    CHK_DIR="${1##*/}"
    if [ "$CHK_DIR" == "$1" ]; then
        PARENT_URL="${ROOT_URL}/"
    else
        PARENT_URL="${ROOT_URL}/${1%/*}/"
    fi

    EXISTING=`curl --silent --list-only "${PARENT_URL}" -u "${VERIFY_CODE}"`
    for DIR in $EXISTING
    do
        if [ "${DIR}" == "${CHK_DIR}" ]; then
            return 0
        fi
    done

    curl --silent "${ROOT_URL}/" -u "${VERIFY_CODE}" -Q "MKD $1" > /dev/null
    echo "Create Directory : $1"
}

# $1 remote directory
# $2 local file
uploadFile()
{
    echo "$2"
    curl "${ROOT_URL}/$1/" -u "${VERIFY_CODE}" -T "$2"
}

{{#each dirs}}
checkUploadDir {{this}}
{{/each}}

{{#each files}}
uploadFile {{remote_dir}} "$UPLOAD_FROM_ROOT_DIR/{{local_path}}"
{{/each}}
"#;

/// Upload through the interactive `ftp` client.
pub const UPLOAD_FTP_TEMPLATE: &str = r#"#!/bin/bash
# Uploads {{build_mode}} bundles for {{build_target}} ({{app_version}}).

UPLOAD_FROM_ROOT_DIR="{{local_root}}"

# $1 directory relative to the server root
checkUploadDir()
{
ftp -n <<!
open {{host}} {{port}}
user {{account_id}} {{password}}
binary
mkdir $1
close
bye
!
}

# $1 local directory
# $2 remote directory
# $3 file name
uploadFile()
{
ftp -n <<!
open {{host}} {{port}}
user {{account_id}} {{password}}
binary
quote pasv
passive
cd $2
lcd $1
prompt off
put $3
close
bye
!
}

{{#each dirs}}
checkUploadDir {{this}}
{{/each}}

{{#each files}}
uploadFile "$UPLOAD_FROM_ROOT_DIR/{{local_dir}}" {{remote_dir}} {{file_name}}
{{/each}}
"#;

/// Dated, HMAC-signed CDN purge.
pub const REFRESH_CDN_TEMPLATE: &str = r#"#!/bin/bash

username="{{user_name}}"
apiKey="{{api_key}}"
date=`env LANG="en_US.UTF-8" date -u "+%a, %d %b %Y %H:%M:%S GMT"`
password=`echo -en "$date" | openssl dgst -sha1 -hmac $apiKey -binary | openssl enc -base64`

curl -i --url "{{url}}" \
-X "POST" \
-u "$username:$password" \
-H "Date:$date" \
-H "Content-Type: application/json" \
-d '{{body}}'
"#;
